//! Adapts the synthesized OpenAPI tool set to the router's `Downstream`
//! interface, so a bridged REST API is routed exactly like a spawned child
//! or a remote SSE server despite answering locally rather than forwarding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::{JSONRPCMessage, JsonRpcErrorCode, JsonRpcErrorObject, MessageId};
use mcpgate_openapi::{invocation, InvocationContext, SsrfPolicy, ToolDescriptor};
use mcpgate_router::Downstream;
use mcpgate_transport::header_policy::merge_headers;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

pub struct OpenApiDownstream {
    tools: Vec<ToolDescriptor>,
    api_host: String,
    tool_timeout_ms: u64,
    /// Gateway-configured headers (`--header`), the lowest-precedence
    /// layer merged under the caller's own headers on every outbound
    /// call this bridge makes.
    gateway_headers: HashMap<String, String>,
    /// Pins every outbound call to `api_host`'s own authority, so a path
    /// argument can never redirect the bridge to a different host.
    ssrf_policy: SsrfPolicy,
    http: reqwest::Client,
    inbound_tx: mpsc::Sender<JSONRPCMessage>,
    inbound_rx: AsyncMutex<mpsc::Receiver<JSONRPCMessage>>,
}

impl OpenApiDownstream {
    pub fn new(
        tools: Vec<ToolDescriptor>,
        api_host: String,
        tool_timeout_ms: u64,
        gateway_headers: HashMap<String, String>,
    ) -> Arc<Self> {
        let ssrf_policy = reqwest::Url::parse(&api_host)
            .ok()
            .and_then(|u| u.host_str().map(SsrfPolicy::pinned_to))
            .unwrap_or_else(SsrfPolicy::open);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        Arc::new(Self {
            tools,
            api_host,
            tool_timeout_ms,
            gateway_headers,
            ssrf_policy,
            http: reqwest::Client::new(),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
        })
    }

    /// The resolved MCP template served at `/mcp-config`.
    pub fn resolved_template(&self) -> Value {
        serde_json::json!({
            "server": { "name": "mcpgate-openapi-bridge" },
            "tools": self.tools,
        })
    }

    async fn handle(
        &self,
        request: &JSONRPCMessage,
        headers: &HashMap<String, String>,
    ) -> Option<JSONRPCMessage> {
        let id = request.id()?.clone();
        let response = match request.method() {
            Some("tools/list") => {
                JSONRPCMessage::result(id, serde_json::json!({ "tools": self.tools }))
            }
            Some("tools/call") => self.handle_tool_call(id, request, headers).await,
            Some(other) => JSONRPCMessage::error(
                id,
                JsonRpcErrorObject::new(
                    JsonRpcErrorCode::MethodNotFound.code(),
                    format!("unsupported method for OpenAPI bridge: {other}"),
                ),
            ),
            None => JSONRPCMessage::error(
                id,
                JsonRpcErrorObject::new(JsonRpcErrorCode::InvalidRequest.code(), "missing method"),
            ),
        };
        Some(response)
    }

    async fn handle_tool_call(
        &self,
        id: MessageId,
        request: &JSONRPCMessage,
        headers: &HashMap<String, String>,
    ) -> JSONRPCMessage {
        let params = match request {
            JSONRPCMessage::Request { params, .. } => params.clone().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let tool_name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let Some(tool) = self.tools.iter().find(|t| t.name == tool_name) else {
            return JSONRPCMessage::error(
                id,
                JsonRpcErrorObject::new(
                    JsonRpcErrorCode::MethodNotFound.code(),
                    format!("unknown tool: {tool_name}"),
                ),
            );
        };
        let args = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));
        // Gateway defaults, then the caller's own headers on top, per the
        // gateway-defaults/bridge-configured/client precedence.
        let merged_headers = merge_headers(&[&self.gateway_headers, headers]);
        let ctx = InvocationContext {
            base_url: &self.api_host,
            extra_headers: &merged_headers,
            timeout_ms: self.tool_timeout_ms,
            ssrf_policy: self.ssrf_policy.clone(),
        };

        let outcome = match invocation::prepare_request(tool, &args, &ctx) {
            Ok(prepared) => invocation::invoke_with_timeout(&self.http, tool, prepared, &ctx).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(result) => JSONRPCMessage::result(id, result),
            Err(err) => JSONRPCMessage::error(id, err.to_jsonrpc_error()),
        }
    }
}

#[async_trait]
impl Downstream for OpenApiDownstream {
    async fn send(&self, message: JSONRPCMessage, headers: &HashMap<String, String>) -> GatewayResult<()> {
        let Some(response) = self.handle(&message, headers).await else {
            return Ok(());
        };
        self.inbound_tx
            .send(response)
            .await
            .map_err(|_| GatewayError::transport("openapi bridge closed"))
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }

    fn generation(&self) -> u64 {
        0
    }
}
