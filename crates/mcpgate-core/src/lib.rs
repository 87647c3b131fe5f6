//! Envelope types, session management, and error taxonomy shared by every
//! crate in the gateway.

pub mod error;
pub mod jsonrpc;
pub mod session;

pub use error::{GatewayError, GatewayErrorExt, GatewayResult};
pub use jsonrpc::{JsonRpcErrorObject, JsonRpcErrorCode, JSONRPCMessage, MessageId, JSONRPC_VERSION};
pub use session::{Session, SessionManager};
