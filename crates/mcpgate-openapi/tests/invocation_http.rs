//! HTTP-mocked integration tests for the OpenAPI bridge's `tools/call`
//! execution path, covering the outbound request against a real (mocked)
//! server rather than just the request-building logic exercised by the
//! crate's unit tests.

use mcpgate_core::error::GatewayError;
use mcpgate_openapi::{
    invoke, prepare_request, ArgPosition, ArgType, InvocationContext, RequestTemplate,
    ResponseTemplate, ToolArg, ToolDescriptor,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate as MockResponseTemplate};

fn tool_with_args(url: &str, http_method: &str, args: Vec<ToolArg>) -> ToolDescriptor {
    ToolDescriptor {
        name: "t".to_string(),
        description: "d".to_string(),
        args,
        request_template: RequestTemplate {
            url: url.to_string(),
            method: http_method.to_string(),
            static_headers: vec![],
        },
        response_template: ResponseTemplate::default(),
    }
}

fn arg(name: &str, position: ArgPosition, required: bool) -> ToolArg {
    ToolArg {
        name: name.to_string(),
        description: None,
        arg_type: ArgType::String,
        required,
        position,
    }
}

#[tokio::test]
async fn successful_json_response_is_wrapped_as_text_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(MockResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 1 })))
        .mount(&server)
        .await;

    let tool = tool_with_args("/users/{id}", "GET", vec![arg("id", ArgPosition::Path, true)]);
    let ctx = InvocationContext {
        base_url: &server.uri(),
        ..Default::default()
    };
    let prepared = prepare_request(&tool, &serde_json::json!({ "id": "1" }), &ctx).unwrap();
    let client = reqwest::Client::new();
    let result = invoke(&client, &tool, prepared).await.unwrap();
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("\"id\""));
}

#[tokio::test]
async fn non_success_status_becomes_upstream_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(MockResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let tool = tool_with_args("/missing", "GET", vec![]);
    let ctx = InvocationContext {
        base_url: &server.uri(),
        ..Default::default()
    };
    let prepared = prepare_request(&tool, &serde_json::json!({}), &ctx).unwrap();
    let client = reqwest::Client::new();
    let err = invoke(&client, &tool, prepared).await.unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamStatus { status: 404, .. }));
}
