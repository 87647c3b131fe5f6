//! Executes a `tools/call` against a synthesized `ToolDescriptor`: binds
//! declared args into the URL, query string, headers, and JSON body, then
//! issues the outbound HTTP request and wraps the response as MCP content.

use std::collections::HashMap;
use std::time::Duration;

use mcpgate_core::error::{GatewayError, GatewayResult};
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::descriptor::{ArgPosition, ArgType, ToolArg, ToolDescriptor, expand_header_templates};
use crate::security::SsrfPolicy;

pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// MCP wraps every tool result as a list of content blocks; this bridge
/// only ever produces a single text block per call.
pub fn wrap_as_text_content(text: String) -> Value {
    serde_json::json!({
        "content": [ { "type": "text", "text": text } ]
    })
}

pub struct InvocationContext<'a> {
    pub base_url: &'a str,
    pub extra_headers: &'a HashMap<String, String>,
    pub timeout_ms: u64,
    pub ssrf_policy: SsrfPolicy,
}

impl Default for InvocationContext<'_> {
    fn default() -> Self {
        InvocationContext {
            base_url: "",
            extra_headers: EMPTY_HEADERS.get_or_init(HashMap::new),
            timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            ssrf_policy: SsrfPolicy::open(),
        }
    }
}

static EMPTY_HEADERS: std::sync::OnceLock<HashMap<String, String>> = std::sync::OnceLock::new();

/// Validates that every required arg is present, raising the exact
/// JSON-RPC `-32602` class of error before any network call is made.
pub fn validate_args(tool: &ToolDescriptor, supplied: &Value) -> GatewayResult<()> {
    let supplied = supplied.as_object();
    for arg in &tool.args {
        if !arg.required {
            continue;
        }
        let present = supplied
            .and_then(|m| m.get(&arg.name))
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if !present {
            return Err(GatewayError::MissingParameter {
                name: arg.name.clone(),
            });
        }
    }
    Ok(())
}

fn coerce(value: &Value, arg_type: ArgType) -> String {
    match (value, arg_type) {
        (Value::String(s), _) => s.clone(),
        (other, _) => other.to_string(),
    }
}

fn path_param_pattern(name: &str) -> Regex {
    Regex::new(&format!(r"\{{{}\}}", regex::escape(name))).expect("valid path param regex")
}

/// Builds the fully-resolved request: path-substituted URL (still to be
/// joined against the base), query string, header set, and JSON body.
#[derive(Debug)]
pub struct PreparedRequest {
    pub url: Url,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

pub fn prepare_request(
    tool: &ToolDescriptor,
    args: &Value,
    ctx: &InvocationContext,
) -> GatewayResult<PreparedRequest> {
    validate_args(tool, args)?;
    let args_obj = args.as_object().cloned().unwrap_or_default();

    let mut path = tool.request_template.url.clone();
    let mut query_pairs: Vec<(String, String)> = Vec::new();
    let mut body_fields = serde_json::Map::new();
    let mut headers: Vec<(String, String)> = Vec::new();

    for (name, value) in &args_obj {
        let Some(arg) = find_arg(tool, name) else {
            continue;
        };
        match arg.position {
            ArgPosition::Path => {
                let encoded = url::form_urlencoded::byte_serialize(coerce(value, arg.arg_type).as_bytes())
                    .collect::<String>();
                path = path_param_pattern(name).replace(&path, encoded.as_str()).into_owned();
            }
            ArgPosition::Query => query_pairs.push((name.clone(), coerce(value, arg.arg_type))),
            ArgPosition::Header => headers.push((name.clone(), coerce(value, arg.arg_type))),
            ArgPosition::Body => {
                body_fields.insert(name.clone(), value.clone());
            }
        }
    }

    let mut url = Url::parse(ctx.base_url)
        .map_err(|e| GatewayError::configuration(format!("invalid base URL: {e}")))?
        .join(&path)
        .map_err(|e| GatewayError::configuration(format!("invalid tool path {path}: {e}")))?;

    if !query_pairs.is_empty() {
        let mut qp = url.query_pairs_mut();
        for (k, v) in &query_pairs {
            qp.append_pair(k, v);
        }
        drop(qp);
    }

    ctx.ssrf_policy.validate(&url)?;

    for (k, v) in &tool.request_template.static_headers {
        headers.push((k.clone(), expand_header_templates(v)));
    }
    for (k, v) in ctx.extra_headers {
        headers.push((k.clone(), v.clone()));
    }

    let body = if body_fields.is_empty() {
        None
    } else {
        Some(Value::Object(body_fields))
    };

    Ok(PreparedRequest {
        url,
        method: tool.request_template.method.clone(),
        headers,
        body,
    })
}

fn find_arg<'a>(tool: &'a ToolDescriptor, name: &str) -> Option<&'a ToolArg> {
    tool.args.iter().find(|a| a.name == name)
}

/// Issues the prepared request and wraps a successful response as MCP
/// text content, applying the tool's `response_template.prepend_body`
/// prefix and falling back to an empty-result sentinel for bodiless
/// 2xx responses (e.g. `204 No Content`).
pub async fn invoke(
    client: &reqwest::Client,
    tool: &ToolDescriptor,
    prepared: PreparedRequest,
) -> GatewayResult<Value> {
    let method = reqwest::Method::from_bytes(prepared.method.as_bytes())
        .map_err(|_| GatewayError::configuration(format!("unsupported HTTP method: {}", prepared.method)))?;

    let mut request = client.request(method, prepared.url.clone());
    for (k, v) in &prepared.headers {
        request = request.header(k, v);
    }
    if let Some(body) = &prepared.body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| GatewayError::transport(format!("calling {}: {e}", prepared.url)))?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let raw = response
        .text()
        .await
        .map_err(|e| GatewayError::transport(e.to_string()))?;

    if !status.is_success() {
        return Err(GatewayError::UpstreamStatus {
            status: status.as_u16(),
            body: raw,
        });
    }

    let mut text = if raw.trim().is_empty() {
        "(empty response)".to_string()
    } else if content_type.contains("application/json") {
        serde_json::from_str::<Value>(&raw)
            .map(|v| serde_json::to_string_pretty(&v).unwrap_or(raw.clone()))
            .unwrap_or(raw)
    } else {
        raw
    };

    if let Some(prefix) = &tool.response_template.prepend_body {
        text = format!("{prefix}{text}");
    }

    Ok(wrap_as_text_content(text))
}

pub fn timeout_for(ctx: &InvocationContext) -> Duration {
    Duration::from_millis(ctx.timeout_ms)
}

pub async fn invoke_with_timeout(
    client: &reqwest::Client,
    tool: &ToolDescriptor,
    prepared: PreparedRequest,
    ctx: &InvocationContext<'_>,
) -> GatewayResult<Value> {
    let tool_name = tool.name.clone();
    match tokio::time::timeout(timeout_for(ctx), invoke(client, tool, prepared)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::ToolTimeout {
            tool: tool_name,
            timeout_ms: ctx.timeout_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{RequestTemplate, ResponseTemplate};

    fn tool_with_args(url: &str, method: &str, args: Vec<ToolArg>) -> ToolDescriptor {
        ToolDescriptor {
            name: "t".to_string(),
            description: "d".to_string(),
            args,
            request_template: RequestTemplate {
                url: url.to_string(),
                method: method.to_string(),
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

    #[test]
    fn missing_required_arg_is_rejected_before_any_request_is_built() {
        let tool = tool_with_args("/users/{id}", "GET", vec![arg("id", ArgPosition::Path, true)]);
        let err = validate_args(&tool, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, GatewayError::MissingParameter { name } if name == "id"));
    }

    #[test]
    fn path_param_is_substituted_and_query_param_is_appended() {
        let tool = tool_with_args(
            "/users/{id}",
            "GET",
            vec![
                arg("id", ArgPosition::Path, true),
                arg("verbose", ArgPosition::Query, false),
            ],
        );
        let ctx = InvocationContext {
            base_url: "http://example.com",
            ..Default::default()
        };
        let prepared = prepare_request(
            &tool,
            &serde_json::json!({ "id": "42", "verbose": "true" }),
            &ctx,
        )
        .unwrap();
        assert_eq!(prepared.url.path(), "/users/42");
        assert_eq!(
            prepared.url.query_pairs().find(|(k, _)| k == "verbose"),
            Some(("verbose".into(), "true".into()))
        );
    }

    #[test]
    fn body_args_are_composed_into_a_json_object() {
        let tool = tool_with_args("/users", "POST", vec![arg("name", ArgPosition::Body, true)]);
        let ctx = InvocationContext {
            base_url: "http://example.com",
            ..Default::default()
        };
        let prepared =
            prepare_request(&tool, &serde_json::json!({ "name": "ada" }), &ctx).unwrap();
        assert_eq!(prepared.body, Some(serde_json::json!({ "name": "ada" })));
    }

    #[test]
    fn ssrf_blocked_target_is_rejected_during_preparation() {
        let tool = tool_with_args("/x", "GET", vec![]);
        let ctx = InvocationContext {
            base_url: "http://169.254.169.254",
            ..Default::default()
        };
        let err = prepare_request(&tool, &serde_json::json!({}), &ctx).unwrap_err();
        assert!(matches!(err, GatewayError::SsrfBlocked { .. }));
    }
}
