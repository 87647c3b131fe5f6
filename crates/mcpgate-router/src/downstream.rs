//! Unifies the two shapes a downstream can take — a supervised local
//! child process, or a remote MCP server reached over SSE — behind one
//! interface the router forwards through without caring which it is.

use async_trait::async_trait;
use mcpgate_core::error::GatewayResult;
use mcpgate_core::jsonrpc::JSONRPCMessage;
use mcpgate_transport::sse::SseClientTransport;
use mcpgate_transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;

use crate::child_supervisor::ChildSupervisor;

/// Headers carried alongside a forwarded request, for downstream kinds
/// that make their own outbound HTTP calls (the OpenAPI bridge) rather
/// than just relaying bytes. A child process or a remote SSE server has
/// no use for them and ignores the argument.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn send(&self, message: JSONRPCMessage, headers: &HashMap<String, String>) -> GatewayResult<()>;
    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>>;
    fn generation(&self) -> u64;

    /// Part of the shutdown handshake: notify, wait, then terminate.
    /// A no-op for downstreams with nothing local to tear down.
    async fn shutdown(&self) {}
}

#[async_trait]
impl Downstream for ChildSupervisor {
    async fn send(&self, message: JSONRPCMessage, _headers: &HashMap<String, String>) -> GatewayResult<()> {
        ChildSupervisor::send(self, message).await
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        ChildSupervisor::recv(self).await
    }

    fn generation(&self) -> u64 {
        ChildSupervisor::generation(self)
    }

    async fn shutdown(&self) {
        ChildSupervisor::shutdown(self).await
    }
}

/// A remote downstream has no reconnect state machine of its own in this
/// implementation; its generation never advances, so reconnection
/// invalidation simply never triggers for it.
pub struct RemoteDownstream {
    transport: Arc<SseClientTransport>,
}

impl RemoteDownstream {
    pub fn new(transport: Arc<SseClientTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Downstream for RemoteDownstream {
    async fn send(&self, message: JSONRPCMessage, _headers: &HashMap<String, String>) -> GatewayResult<()> {
        self.transport.send(message).await
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        self.transport.recv().await
    }

    fn generation(&self) -> u64 {
        0
    }
}
