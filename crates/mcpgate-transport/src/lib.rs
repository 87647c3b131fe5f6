//! Wire transport adapters. Every adapter frames `JSONRPCMessage`s onto a
//! concrete transport and exposes itself to the router through the same
//! three operations: `send`, an inbound message stream, and an idempotent
//! `close`.

pub mod header_policy;
pub mod sink;
pub mod sse;
pub mod stdio;
pub mod streamable_http;
pub mod websocket;

use async_trait::async_trait;
use mcpgate_core::GatewayResult;
use mcpgate_core::jsonrpc::JSONRPCMessage;

/// The four wire transports this gateway speaks, plus the internal
/// child-process transport used by the downstream supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Sse,
    WebSocket,
    StreamableHttp,
    ChildProcess,
}

/// A framed, bidirectional message channel. Adapters implement only
/// framing; semantic validation belongs to the router.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn send(&self, message: JSONRPCMessage) -> GatewayResult<()>;

    /// Await the next inbound message. `Ok(None)` signals a clean close;
    /// blank/unparseable lines are filtered out by the adapter and never
    /// surface here.
    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>>;

    async fn close(&self) -> GatewayResult<()>;
}
