//! A bounded channel wrapped as a `Session`-compatible outbound sink.
//!
//! Every server-side adapter (SSE, WebSocket, Streamable HTTP) hands the
//! session a `ChannelSink` instead of direct socket access: the session
//! and router only ever enqueue, and a per-connection writer task owns
//! the actual socket. A full queue means the client is not draining fast
//! enough; rather than block the router, the send fails immediately and
//! the caller retires the connection, matching the backpressure design.

use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::JSONRPCMessage;
use mcpgate_core::session::OutboundSink;
use tokio::sync::mpsc;

/// Outbound messages queued per connection before backpressure kicks in.
pub const DEFAULT_SEND_QUEUE_BOUND: usize = 256;

pub struct ChannelSink {
    tx: mpsc::Sender<JSONRPCMessage>,
}

impl ChannelSink {
    pub fn new(bound: usize) -> (Self, mpsc::Receiver<JSONRPCMessage>) {
        let (tx, rx) = mpsc::channel(bound);
        (Self { tx }, rx)
    }
}

impl OutboundSink for ChannelSink {
    fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        self.tx
            .try_send(message)
            .map_err(|_| GatewayError::transport("send queue full or connection closed"))
    }
}
