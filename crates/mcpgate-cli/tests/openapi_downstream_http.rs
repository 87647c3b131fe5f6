//! HTTP-mocked integration tests for the OpenAPI bridge's `Downstream`
//! adapter, covering the full `tools/call` path including the
//! gateway-defaults/caller-headers precedence enforced on the way out.

use std::collections::HashMap;

use mcpgate_cli::openapi_downstream::OpenApiDownstream;
use mcpgate_core::jsonrpc::{JSONRPCMessage, MessageId};
use mcpgate_openapi::{ArgPosition, ArgType, RequestTemplate, ResponseTemplate, ToolArg, ToolDescriptor};
use mcpgate_router::Downstream;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate as MockResponseTemplate};

fn echo_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "echo".to_string(),
        description: "d".to_string(),
        args: vec![ToolArg {
            name: "id".to_string(),
            description: None,
            arg_type: ArgType::String,
            required: true,
            position: ArgPosition::Path,
        }],
        request_template: RequestTemplate {
            url: "/echo/{id}".to_string(),
            method: "GET".to_string(),
            static_headers: vec![],
        },
        response_template: ResponseTemplate::default(),
    }
}

#[tokio::test]
async fn tools_call_invokes_the_matching_tool_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/echo/7"))
        .respond_with(MockResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let bridge = OpenApiDownstream::new(vec![echo_tool()], server.uri(), 30_000, HashMap::new());
    bridge
        .send(
            JSONRPCMessage::request(
                MessageId::Number(2),
                "tools/call",
                Some(serde_json::json!({ "name": "echo", "arguments": { "id": "7" } })),
            ),
            &HashMap::new(),
        )
        .await
        .unwrap();
    let response = bridge.recv().await.unwrap().unwrap();
    let JSONRPCMessage::Response { result, error, .. } = response else {
        panic!("expected a response");
    };
    assert!(error.is_none());
    assert!(result.is_some());
}

#[tokio::test]
async fn caller_headers_override_gateway_defaults_on_outbound_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/echo/7"))
        .and(header("authorization", "Bearer caller-token"))
        .respond_with(MockResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut gateway_headers = HashMap::new();
    gateway_headers.insert("authorization".to_string(), "Bearer gateway-default".to_string());
    let bridge = OpenApiDownstream::new(vec![echo_tool()], server.uri(), 30_000, gateway_headers);

    let mut caller_headers = HashMap::new();
    caller_headers.insert("authorization".to_string(), "Bearer caller-token".to_string());
    bridge
        .send(
            JSONRPCMessage::request(
                MessageId::Number(4),
                "tools/call",
                Some(serde_json::json!({ "name": "echo", "arguments": { "id": "7" } })),
            ),
            &caller_headers,
        )
        .await
        .unwrap();

    let response = bridge.recv().await.unwrap().unwrap();
    let JSONRPCMessage::Response { error, .. } = response else {
        panic!("expected a response");
    };
    assert!(error.is_none());
}
