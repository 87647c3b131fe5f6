//! Server-Sent Events transports: the server half exposed to browser/HTTP
//! clients (GET event stream + POST back-channel) and the client half used
//! when the gateway's downstream is itself a remote MCP server reachable
//! only over SSE (`--sse <url>`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::StreamExt;
use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::JSONRPCMessage;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::{Transport, TransportKind};

pub const DEFAULT_SSE_PATH: &str = "/sse";
pub const DEFAULT_MESSAGE_PATH: &str = "/message";

/// Creates the per-session broadcast channel backing one SSE connection.
/// The sender is wrapped in an [`SseOutboundSink`] and handed to the
/// session; the receiver drives that session's own `build_event_stream`.
/// A single-subscriber channel would work just as well today (exactly one
/// GET stream reads it), but broadcast lets a future reconnect attach a
/// second receiver without changing this call site.
pub fn new_session_channel() -> (broadcast::Sender<JSONRPCMessage>, broadcast::Receiver<JSONRPCMessage>) {
    broadcast::channel(1024)
}

/// Build the SSE `data:` event stream for one GET connection. First emits
/// a `connected` event carrying the session id and the URL the client
/// should POST its messages back to, then relays every message
/// broadcast on this session's own channel as a `message` event; a
/// lagged receiver surfaces as an `error` event rather than silently
/// dropping messages.
pub fn build_event_stream(
    mut receiver: broadcast::Receiver<JSONRPCMessage>,
    session_id: String,
    message_endpoint: String,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = async_stream::stream! {
        let connected = serde_json::json!({
            "session_id": session_id,
            "endpoint": message_endpoint,
        });
        yield Ok(Event::default().event("connected").data(connected.to_string()));

        loop {
            match receiver.recv().await {
                Ok(message) => {
                    let data = message.to_line().unwrap_or_default();
                    yield Ok(Event::default().event("message").data(data));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    let err = serde_json::json!({ "code": "LAGGED", "skipped": skipped });
                    yield Ok(Event::default().event("error").data(err.to_string()));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// `OutboundSink` adapter handed to the `Session`: enqueues onto the
/// shared broadcast channel rather than a per-connection queue, since one
/// SSE GET stream serves exactly one session and the broadcast receiver
/// is created per-connection above.
pub struct SseOutboundSink {
    sender: broadcast::Sender<JSONRPCMessage>,
}

impl SseOutboundSink {
    pub fn new(sender: broadcast::Sender<JSONRPCMessage>) -> Self {
        Self { sender }
    }
}

impl mcpgate_core::session::OutboundSink for SseOutboundSink {
    fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        self.sender
            .send(message)
            .map(|_| ())
            .map_err(|_| GatewayError::transport("no active SSE subscriber"))
    }
}

/// Resolve the session id for an inbound POST per the precedence order:
/// explicit query parameter, then `mcp-session-id` header, then
/// `x-session-id` header, then (when exactly one session is active and
/// `strict_sessions` is off) fall back to that session.
pub fn resolve_session_id(
    query: Option<&str>,
    headers: &HashMap<String, String>,
    single_active_session: Option<&str>,
    strict_sessions: bool,
) -> Option<String> {
    if let Some(q) = query {
        return Some(q.to_string());
    }
    if let Some(h) = headers.get("mcp-session-id") {
        return Some(h.clone());
    }
    if let Some(h) = headers.get("x-session-id") {
        return Some(h.clone());
    }
    if !strict_sessions {
        return single_active_session.map(str::to_string);
    }
    None
}

/// A remote MCP server reached over SSE: GET subscribes to the event
/// stream, POST carries outbound requests. Used when the gateway's
/// downstream is `--sse <url>` instead of a local child process.
pub struct SseClientTransport {
    http: reqwest::Client,
    post_url: reqwest::Url,
    inbound_rx: AsyncMutex<mpsc::Receiver<JSONRPCMessage>>,
    headers: HashMap<String, String>,
}

impl SseClientTransport {
    pub async fn connect(
        sse_url: &str,
        headers: HashMap<String, String>,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::transport(e.to_string()))?;

        let url = reqwest::Url::parse(sse_url)
            .map_err(|e| GatewayError::configuration(format!("invalid SSE url: {e}")))?;

        let mut request = http.get(url.clone());
        for (k, v) in &headers {
            request = request.header(k, v);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("SSE connect failed: {e}")))?;

        let (tx, inbound_rx) = mpsc::channel(256);
        let mut byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find("\n\n") {
                    let raw_event: String = buffer.drain(..pos + 2).collect();
                    for line in raw_event.lines() {
                        if let Some(data) = line.strip_prefix("data:") {
                            if let Some(Ok(message)) = JSONRPCMessage::parse_line(data.trim()) {
                                if tx.send(message).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        // post_url defaults to a sibling "/message" path; callers with a
        // differently-shaped remote server override via with_post_url.
        let mut post_url = url.clone();
        post_url.set_path(DEFAULT_MESSAGE_PATH);

        Ok(Self {
            http,
            post_url,
            inbound_rx: AsyncMutex::new(inbound_rx),
            headers,
        })
    }

    pub fn with_post_url(mut self, post_url: reqwest::Url) -> Self {
        self.post_url = post_url;
        self
    }
}

#[async_trait]
impl Transport for SseClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        let mut request = self.http.post(self.post_url.clone()).json(&message);
        for (k, v) in &self.headers {
            request = request.header(k, v);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("SSE POST failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamStatus { status, body });
        }
        Ok(())
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }

    async fn close(&self) -> GatewayResult<()> {
        debug!("closing SSE client transport");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_precedence_prefers_query_over_headers() {
        let mut headers = HashMap::new();
        headers.insert("mcp-session-id".to_string(), "from-header".to_string());
        let resolved = resolve_session_id(Some("from-query"), &headers, None, false);
        assert_eq!(resolved.as_deref(), Some("from-query"));
    }

    #[test]
    fn falls_back_to_sole_active_session_when_not_strict() {
        let headers = HashMap::new();
        let resolved = resolve_session_id(None, &headers, Some("only-one"), false);
        assert_eq!(resolved.as_deref(), Some("only-one"));
    }

    #[test]
    fn strict_sessions_refuses_fallback() {
        let headers = HashMap::new();
        let resolved = resolve_session_id(None, &headers, Some("only-one"), true);
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn broadcast_sink_errors_with_no_subscribers() {
        let (tx, _rx) = broadcast::channel(4);
        drop(_rx);
        let sink = SseOutboundSink::new(tx);
        let result =
            mcpgate_core::session::OutboundSink::send(&sink, JSONRPCMessage::notification("x", None));
        assert!(result.is_err());
    }
}
