//! JSON-RPC 2.0 envelope types used on every transport this gateway speaks.
//!
//! The wire shape is deliberately a thin subset of the full JSON-RPC
//! grammar: enough to frame, correlate, and forward messages without the
//! gateway ever needing to understand a method's semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version this gateway emits or accepts.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request/response id. Requests and responses share ids of
/// either shape; the gateway treats them as opaque correlation tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{n}"),
            MessageId::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC error object, as carried inside a `Response::Error` payload
/// or synthesized directly by the router/bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Standard and gateway-specific JSON-RPC error codes named in the error
/// handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ToolExecutionTimeout,
    DownstreamRestarted,
    ChildProcessError,
}

impl JsonRpcErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => -32700,
            JsonRpcErrorCode::InvalidRequest => -32600,
            JsonRpcErrorCode::MethodNotFound => -32601,
            JsonRpcErrorCode::InvalidParams => -32602,
            JsonRpcErrorCode::InternalError => -32603,
            JsonRpcErrorCode::ToolExecutionTimeout => -32000,
            JsonRpcErrorCode::DownstreamRestarted => -32001,
            JsonRpcErrorCode::ChildProcessError => -32099,
        }
    }
}

/// One JSON-RPC message as it crosses a transport boundary. Requests,
/// responses, and notifications are distinguished structurally (presence
/// and shape of `id`) rather than by a wrapper tag, matching the wire
/// format every MCP client/server actually emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request {
        jsonrpc: JsonRpcVersionField,
        id: MessageId,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Response {
        jsonrpc: JsonRpcVersionField,
        id: MessageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<JsonRpcErrorObject>,
    },
    Notification {
        jsonrpc: JsonRpcVersionField,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
}

impl JSONRPCMessage {
    pub fn request(id: MessageId, method: impl Into<String>, params: Option<Value>) -> Self {
        JSONRPCMessage::Request {
            jsonrpc: JsonRpcVersionField,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn result(id: MessageId, result: Value) -> Self {
        JSONRPCMessage::Response {
            jsonrpc: JsonRpcVersionField,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: MessageId, error: JsonRpcErrorObject) -> Self {
        JSONRPCMessage::Response {
            jsonrpc: JsonRpcVersionField,
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        JSONRPCMessage::Notification {
            jsonrpc: JsonRpcVersionField,
            method: method.into(),
            params,
        }
    }

    /// The correlation id, if this message carries one.
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            JSONRPCMessage::Request { id, .. } | JSONRPCMessage::Response { id, .. } => Some(id),
            JSONRPCMessage::Notification { .. } => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            JSONRPCMessage::Request { method, .. } | JSONRPCMessage::Notification { method, .. } => {
                Some(method)
            }
            JSONRPCMessage::Response { .. } => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, JSONRPCMessage::Response { .. })
    }

    /// Parse a single line of newline-delimited JSON, as emitted by the
    /// stdio transport. Returns `None` on blank lines; callers treat a
    /// parse failure as a discardable boot-banner line rather than an
    /// error, per the stdio adapter's framing contract.
    pub fn parse_line(line: &str) -> Option<Result<JSONRPCMessage, serde_json::Error>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(serde_json::from_str(trimmed))
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A unit struct that (de)serializes only the literal string `"2.0"`,
/// rejecting any other protocol version during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersionField;

impl Serialize for JsonRpcVersionField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersionField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s != JSONRPC_VERSION {
            return Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )));
        }
        Ok(JsonRpcVersionField)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let msg = JSONRPCMessage::request(
            MessageId::Number(1),
            "tools/call",
            Some(serde_json::json!({"name": "ping"})),
        );
        let line = msg.to_line().unwrap();
        let parsed = JSONRPCMessage::parse_line(&line).unwrap().unwrap();
        assert_eq!(parsed.id(), Some(&MessageId::Number(1)));
        assert_eq!(parsed.method(), Some("tools/call"));
    }

    #[test]
    fn blank_line_is_ignored() {
        assert!(JSONRPCMessage::parse_line("").is_none());
        assert!(JSONRPCMessage::parse_line("   \n").is_none());
    }

    #[test]
    fn garbage_line_is_a_parse_error_not_a_panic() {
        let result = JSONRPCMessage::parse_line("not json at all");
        assert!(result.unwrap().is_err());
    }

    #[test]
    fn response_distinguishes_success_and_error() {
        let ok = JSONRPCMessage::result(MessageId::String("a".into()), serde_json::json!(42));
        assert!(ok.is_response());

        let err = JSONRPCMessage::error(
            MessageId::String("a".into()),
            JsonRpcErrorObject::new(JsonRpcErrorCode::MethodNotFound.code(), "no such method"),
        );
        let line = err.to_line().unwrap();
        assert!(line.contains("-32601"));
    }

    #[test]
    fn rejects_wrong_protocol_version() {
        let bad = r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#;
        let parsed: Result<JSONRPCMessage, _> = serde_json::from_str(bad);
        assert!(parsed.is_err());
    }

    #[test]
    fn notification_has_no_id() {
        let n = JSONRPCMessage::notification("notifications/initialized", None);
        assert_eq!(n.id(), None);
    }
}
