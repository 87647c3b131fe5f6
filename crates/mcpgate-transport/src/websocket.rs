//! Server-side WebSocket adapter. Each accepted connection is one
//! transport handle and one session; a send failure (closed socket, full
//! queue) removes the connection without disturbing any other session.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::JSONRPCMessage;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::sink::ChannelSink;
use crate::{Transport, TransportKind};

/// Split an accepted `axum` websocket into a `Transport` handle (for the
/// router) and a `ChannelSink` (for the `Session`), spawning the writer
/// task that drains outbound messages onto the socket.
pub fn split_socket(socket: WebSocket) -> (WebSocketTransport, ChannelSink) {
    use futures::{SinkExt, StreamExt};

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut outbound_rx) = ChannelSink::new(crate::sink::DEFAULT_SEND_QUEUE_BOUND);

    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let Ok(text) = message.to_line() else { continue };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let (inbound_tx, inbound_rx) = mpsc::channel::<JSONRPCMessage>(256);
    tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(Ok(message)) = JSONRPCMessage::parse_line(&text) {
                        if inbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    debug!(%err, "websocket read error");
                    break;
                }
            }
        }
    });

    (
        WebSocketTransport {
            inbound_rx: AsyncMutex::new(inbound_rx),
        },
        sink,
    )
}

pub struct WebSocketTransport {
    inbound_rx: AsyncMutex<mpsc::Receiver<JSONRPCMessage>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn send(&self, _message: JSONRPCMessage) -> GatewayResult<()> {
        // Outbound delivery goes through the `ChannelSink` returned
        // alongside this handle by `split_socket`, not through this
        // trait method; the router only ever calls `send` on downstream
        // (child/backend) transports, never on a per-connection server
        // adapter, which is addressed via the session's `OutboundSink`.
        Err(GatewayError::transport(
            "use the session's OutboundSink to write to a websocket connection",
        ))
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }

    async fn close(&self) -> GatewayResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queue_bound_is_reused_from_sink_module() {
        assert_eq!(crate::sink::DEFAULT_SEND_QUEUE_BOUND, 256);
    }
}
