//! Couples sessions to a downstream: forwards requests, correlates
//! responses back to the session that issued them, and fans notifications
//! out to every active session.

use std::sync::Arc;

use dashmap::DashMap;
use mcpgate_core::error::GatewayResult;
use mcpgate_core::jsonrpc::{JSONRPCMessage, JsonRpcErrorCode, JsonRpcErrorObject, MessageId};
use mcpgate_core::session::{Session, SessionManager};
use tracing::{debug, warn};

use crate::downstream::Downstream;
use crate::metrics::RouterMetrics;

/// Couples one input side (many sessions) to one shared downstream.
pub struct Router {
    downstream: Arc<dyn Downstream>,
    sessions: Arc<SessionManager>,
    metrics: Arc<RouterMetrics>,
    /// Which session owns each outstanding request id, since a single
    /// shared child serves many sessions and ids are only unique within
    /// one session's own sequence.
    owner: DashMap<MessageId, String>,
}

impl Router {
    pub fn new(
        downstream: Arc<dyn Downstream>,
        sessions: Arc<SessionManager>,
        metrics: Arc<RouterMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            downstream,
            sessions,
            metrics,
            owner: DashMap::new(),
        })
    }

    /// Record the request as pending on its session, claim ownership of
    /// its id, and forward it downstream along with the session's
    /// auth-bearing headers, so a downstream that makes its own outbound
    /// HTTP calls (the OpenAPI bridge) can re-authenticate as the caller.
    pub async fn forward_request(
        &self,
        session: &Arc<Session>,
        request: JSONRPCMessage,
    ) -> GatewayResult<()> {
        let id = request
            .id()
            .cloned()
            .ok_or_else(|| mcpgate_core::error::GatewayError::transport("request has no id"))?;
        session.register_pending(request.clone(), self.downstream.generation())?;
        self.owner.insert(id, session.session_id.clone());
        self.downstream.send(request, &session.auth_headers()).await?;
        self.metrics.record_forwarded();
        Ok(())
    }

    /// Forward a client notification (no id, hence nothing to correlate)
    /// straight through to the downstream. Notifications carry no session
    /// headers to re-authenticate with.
    pub async fn forward_notification(&self, notification: JSONRPCMessage) -> GatewayResult<()> {
        self.downstream.send(notification, &Default::default()).await
    }

    /// Drive the downstream's inbound stream until it closes. Intended to
    /// run as its own task for the lifetime of the gateway process.
    pub async fn pump(self: Arc<Self>) {
        loop {
            match self.downstream.recv().await {
                Ok(Some(message)) => self.handle_downstream_message(message).await,
                Ok(None) => {
                    debug!("downstream closed, stopping router pump");
                    return;
                }
                Err(err) => {
                    warn!(%err, "downstream receive error, stopping router pump");
                    return;
                }
            }
        }
    }

    async fn handle_downstream_message(&self, message: JSONRPCMessage) {
        if message.is_response() {
            self.route_response(message);
            return;
        }

        if message.method() == Some("notifications/reconnected") {
            self.invalidate_stale_pending();
        }

        self.sessions.broadcast(message);
        self.metrics.record_broadcast();
    }

    fn route_response(&self, message: JSONRPCMessage) {
        let Some(id) = message.id().cloned() else {
            return;
        };
        let Some((_, session_id)) = self.owner.remove(&id) else {
            self.metrics.record_stale_response();
            debug!(%id, "dropping response with no known owner");
            return;
        };
        let Some(session) = self.sessions.get(&session_id) else {
            self.metrics.record_stale_response();
            return;
        };
        if session.resolve_pending(&id).is_none() {
            self.metrics.record_stale_response();
            debug!(%id, session_id, "dropping stale response, session moved on");
            return;
        }
        if let Err(err) = session.send(message) {
            warn!(session_id, %err, "failed delivering response, retiring session");
            self.sessions.retire(&session_id);
            self.metrics.record_session_retired();
        }
    }

    /// Fail every pending request older than the most recent downstream
    /// restart with the synthetic `-32001` error, across every session.
    /// The downstream's generation is bumped by its own reconnect logic
    /// before this notification is emitted, so it is the correct boundary:
    /// anything stamped with an older generation was sent to a child that
    /// is now gone and can never answer.
    fn invalidate_stale_pending(&self) {
        let current_generation = self.downstream.generation();
        for session_id in self.sessions.list() {
            let Some(session) = self.sessions.get(&session_id) else {
                continue;
            };
            let stale_ids = session.drain_stale_pending(current_generation);
            for id in stale_ids {
                self.owner.remove(&id);
                let error = JSONRPCMessage::error(
                    id,
                    JsonRpcErrorObject::new(
                        JsonRpcErrorCode::DownstreamRestarted.code(),
                        "downstream restarted before response",
                    ),
                );
                let _ = session.send(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeDownstream {
        inbound: Mutex<Vec<JSONRPCMessage>>,
        sent: Mutex<Vec<JSONRPCMessage>>,
        generation: AtomicU64,
    }

    impl FakeDownstream {
        fn new() -> Self {
            Self {
                inbound: Mutex::new(vec![]),
                sent: Mutex::new(vec![]),
                generation: AtomicU64::new(0),
            }
        }

        fn bump_generation(&self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Downstream for FakeDownstream {
        async fn send(&self, message: JSONRPCMessage, _headers: &std::collections::HashMap<String, String>) -> GatewayResult<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
            Ok(self.inbound.lock().unwrap().pop())
        }

        fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }
    }

    struct RecordingSink {
        sent: Mutex<Vec<JSONRPCMessage>>,
    }

    impl mcpgate_core::session::OutboundSink for RecordingSink {
        fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_request_and_records_ownership() {
        let downstream = Arc::new(FakeDownstream::new());
        let sessions = SessionManager::new(Duration::from_secs(300));
        let metrics = Arc::new(RouterMetrics::default());
        let router = Router::new(downstream.clone(), sessions.clone(), metrics);

        let session = sessions.get_or_create(
            "s1",
            || Arc::new(RecordingSink { sent: Mutex::new(vec![]) }) as Arc<dyn mcpgate_core::session::OutboundSink>,
            Default::default(),
        );

        let request = JSONRPCMessage::request(MessageId::Number(1), "tools/call", None);
        router.forward_request(&session, request).await.unwrap();

        assert_eq!(session.pending_count(), 1);
        assert_eq!(downstream.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn routes_response_back_to_owning_session() {
        let downstream = Arc::new(FakeDownstream::new());
        let sessions = SessionManager::new(Duration::from_secs(300));
        let metrics = Arc::new(RouterMetrics::default());
        let router = Router::new(downstream.clone(), sessions.clone(), metrics);

        let sink = Arc::new(RecordingSink { sent: Mutex::new(vec![]) });
        let session = sessions.get_or_create("s1", || sink.clone() as Arc<dyn mcpgate_core::session::OutboundSink>, Default::default());
        let request = JSONRPCMessage::request(MessageId::Number(7), "tools/call", None);
        router.forward_request(&session, request).await.unwrap();

        let response = JSONRPCMessage::result(MessageId::Number(7), serde_json::json!({"ok": true}));
        router.handle_downstream_message(response).await;

        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn reconnect_notification_fails_only_pending_from_before_the_reconnect() {
        let downstream = Arc::new(FakeDownstream::new());
        let sessions = SessionManager::new(Duration::from_secs(300));
        let metrics = Arc::new(RouterMetrics::default());
        let router = Router::new(downstream.clone(), sessions.clone(), metrics);

        let sink = Arc::new(RecordingSink { sent: Mutex::new(vec![]) });
        let session = sessions.get_or_create("s1", || sink.clone() as Arc<dyn mcpgate_core::session::OutboundSink>, Default::default());

        let pre_reconnect = JSONRPCMessage::request(MessageId::Number(1), "tools/call", None);
        router.forward_request(&session, pre_reconnect).await.unwrap();

        // Simulate the child respawning before the notification arrives, then a
        // second request sent against the new generation while the first is
        // still outstanding.
        downstream.bump_generation();
        let post_reconnect = JSONRPCMessage::request(MessageId::Number(2), "tools/call", None);
        router.forward_request(&session, post_reconnect).await.unwrap();

        router
            .handle_downstream_message(JSONRPCMessage::notification(
                "notifications/reconnected",
                None,
            ))
            .await;

        // Only id 1 (the stale generation) is failed; id 2 survives.
        assert_eq!(session.pending_count(), 1);
        let delivered = sink.sent.lock().unwrap();
        assert_eq!(delivered.len(), 2); // the -32001 error for id 1, then the broadcast notification
    }
}
