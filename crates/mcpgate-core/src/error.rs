//! Gateway-wide error taxonomy.
//!
//! Mirrors the tiered shape of a proxy-style error enum: each variant is
//! named for the layer that raised it (transport, session, downstream,
//! bridge, configuration), carries enough context to build a JSON-RPC
//! error object, and knows whether retrying the operation that produced it
//! is ever worthwhile.

use crate::jsonrpc::{JsonRpcErrorCode, JsonRpcErrorObject};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("stale response for id {id} on session {session_id}")]
    StaleResponse { session_id: String, id: String },

    #[error("downstream restarted before response: {detail}")]
    DownstreamRestarted { detail: String },

    #[error("child process failed after {attempts} reconnect attempts")]
    ChildExhausted { attempts: u32 },

    #[error("missing required argument: {name}")]
    MissingParameter { name: String },

    #[error("request blocked by SSRF policy: {detail}")]
    SsrfBlocked { detail: String },

    #[error("tool execution timeout: {tool}")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        GatewayError::Transport {
            message: message.into(),
        }
    }

    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        GatewayError::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        GatewayError::Configuration {
            message: message.into(),
        }
    }

    /// True when retrying the operation that produced this error stands a
    /// chance of succeeding (used by the child supervisor's reconnect
    /// loop and the bridge's upstream-call path).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. }
                | GatewayError::DownstreamRestarted { .. }
                | GatewayError::Io(_)
        )
    }

    /// Project this error onto the wire as a JSON-RPC error object,
    /// following the code assignment in the error handling design.
    pub fn to_jsonrpc_error(&self) -> JsonRpcErrorObject {
        match self {
            GatewayError::MissingParameter { .. } => {
                JsonRpcErrorObject::new(JsonRpcErrorCode::InvalidParams.code(), self.sanitize())
            }
            GatewayError::ToolNotFound { .. } => {
                JsonRpcErrorObject::new(JsonRpcErrorCode::MethodNotFound.code(), self.sanitize())
            }
            GatewayError::ToolTimeout { .. } => JsonRpcErrorObject::new(
                JsonRpcErrorCode::ToolExecutionTimeout.code(),
                self.sanitize(),
            ),
            GatewayError::DownstreamRestarted { .. } => JsonRpcErrorObject::new(
                JsonRpcErrorCode::DownstreamRestarted.code(),
                self.sanitize(),
            ),
            GatewayError::ChildExhausted { .. } => JsonRpcErrorObject::new(
                JsonRpcErrorCode::DownstreamRestarted.code(),
                self.sanitize(),
            ),
            _ => JsonRpcErrorObject::new(JsonRpcErrorCode::InternalError.code(), self.sanitize()),
        }
    }

    /// A message safe to hand back to a client: internal details (file
    /// paths, stack context) are stripped, but the parts a caller needs
    /// to act on (tool name, timeout duration) are preserved.
    pub fn sanitize(&self) -> String {
        match self {
            GatewayError::Transport { .. } => "transport error".to_string(),
            GatewayError::SessionNotFound { .. } => "session not found".to_string(),
            GatewayError::StaleResponse { .. } => "stale response".to_string(),
            GatewayError::DownstreamRestarted { .. } => {
                "downstream restarted before response".to_string()
            }
            GatewayError::ChildExhausted { attempts } => {
                format!("child process failed after {attempts} reconnect attempts")
            }
            GatewayError::MissingParameter { name } => {
                format!("missing required argument: {name}")
            }
            GatewayError::SsrfBlocked { .. } => "request blocked by security policy".to_string(),
            GatewayError::ToolTimeout { tool, .. } => format!("tool execution timeout: {tool}"),
            GatewayError::UpstreamStatus { status, .. } => format!("upstream returned {status}"),
            GatewayError::ToolNotFound { name } => format!("tool not found: {name}"),
            GatewayError::Configuration { .. } => "configuration error".to_string(),
            GatewayError::Serialization(_) => "serialization error".to_string(),
            GatewayError::Io(_) => "i/o error".to_string(),
        }
    }
}

/// Context-extension trait mirroring the ergonomic `.context_foo("...")`
/// pattern used to attach layer-specific context to a plain `Result`
/// before it is converted into a `GatewayError`.
pub trait GatewayErrorExt<T> {
    fn transport_context(self, message: impl Into<String>) -> GatewayResult<T>;
    fn config_context(self, message: impl Into<String>) -> GatewayResult<T>;
}

impl<T, E> GatewayErrorExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn transport_context(self, message: impl Into<String>) -> GatewayResult<T> {
        self.map_err(|e| GatewayError::transport(format!("{}: {e}", message.into())))
    }

    fn config_context(self, message: impl Into<String>) -> GatewayResult<T> {
        self.map_err(|e| GatewayError::configuration(format!("{}: {e}", message.into())))
    }
}
