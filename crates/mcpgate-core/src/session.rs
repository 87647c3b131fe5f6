//! Session lifecycle and the per-session pending-request table.
//!
//! The pending table is the same shape as a bidirectional id-translation
//! map: bounded in size, entries expire after a timeout, and a background
//! task sweeps expired entries so a misbehaving or abandoned client cannot
//! grow the table without bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::jsonrpc::{JSONRPCMessage, MessageId};

/// Maximum outstanding requests tracked per session before new requests
/// are rejected. Mirrors the bounded-map pattern used to cap memory under
/// an abandoned or adversarial client.
pub const MAX_PENDING_PER_SESSION: usize = 10_000;

/// How long a pending request is tracked before it is considered
/// abandoned and swept by the eviction task.
pub const PENDING_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the session manager's background reaper runs.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// A sink a session can be pushed outbound messages through. Implemented
/// by each concrete transport adapter; kept as a trait here so this crate
/// does not need to depend on any transport implementation.
pub trait OutboundSink: Send + Sync {
    /// Enqueue a message for delivery. Returns an error if the queue is
    /// full or the connection has already closed — the caller (the
    /// router) treats either as grounds to retire the session.
    fn send(&self, message: JSONRPCMessage) -> GatewayResult<()>;
}

struct PendingEntry {
    request: JSONRPCMessage,
    registered_at: Instant,
    /// The downstream's generation at the moment this request was sent.
    /// A reconnect bumps the downstream's generation; any entry recorded
    /// under an older generation can no longer receive a real response
    /// and must be failed rather than left to hang.
    generation: u64,
}

/// One client conversation. Holds the outstanding request table and the
/// header snapshot used to re-authenticate bridge-originated calls.
pub struct Session {
    pub session_id: String,
    pub created_at: Instant,
    last_activity: std::sync::Mutex<Instant>,
    pending: DashMap<MessageId, PendingEntry>,
    outbound: Arc<dyn OutboundSink>,
    client_headers: HashMap<String, String>,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        outbound: Arc<dyn OutboundSink>,
        client_headers: HashMap<String, String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_activity: std::sync::Mutex::new(now),
            pending: DashMap::new(),
            outbound,
            client_headers,
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock().expect("last_activity poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .expect("last_activity poisoned")
            .elapsed()
    }

    /// Headers whose key contains `token`, `auth`, or `key` (case
    /// insensitively), used when the OpenAPI bridge must forward the
    /// caller's own credentials to a derived outbound call.
    pub fn auth_headers(&self) -> HashMap<String, String> {
        self.client_headers
            .iter()
            .filter(|(k, _)| {
                let lower = k.to_lowercase();
                lower.contains("token") || lower.contains("auth") || lower.contains("key")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn client_headers(&self) -> &HashMap<String, String> {
        &self.client_headers
    }

    /// Record an outbound request as pending a response. `generation` is
    /// the downstream's generation at send time, stamped onto the entry
    /// so a later reconnect can tell which in-flight requests it made
    /// unanswerable.
    pub fn register_pending(&self, request: JSONRPCMessage, generation: u64) -> GatewayResult<()> {
        let id = request
            .id()
            .cloned()
            .ok_or_else(|| GatewayError::transport("request has no id"))?;
        if self.pending.len() >= MAX_PENDING_PER_SESSION {
            self.evict_expired_pending();
        }
        if self.pending.len() >= MAX_PENDING_PER_SESSION {
            return Err(GatewayError::transport(
                "pending request table full for session",
            ));
        }
        self.pending.insert(
            id,
            PendingEntry {
                request,
                registered_at: Instant::now(),
                generation,
            },
        );
        Ok(())
    }

    /// Resolve a pending request by id, removing it from the table. A
    /// `None` result means the response is stale (session retired its
    /// record, or the id was never registered) and must be dropped by
    /// the caller without error.
    pub fn resolve_pending(&self, id: &MessageId) -> Option<JSONRPCMessage> {
        self.pending.remove(id).map(|(_, entry)| entry.request)
    }

    /// Fail and remove every pending entry registered under a generation
    /// older than `current_generation`, returning their ids. Called after
    /// a downstream reconnect so callers waiting on a pre-restart request
    /// get a synthetic error instead of hanging forever; requests issued
    /// since the reconnect (already stamped with the new generation) are
    /// left in place.
    pub fn drain_stale_pending(&self, current_generation: u64) -> Vec<MessageId> {
        let mut stale = Vec::new();
        self.pending.retain(|id, entry| {
            if entry.generation < current_generation {
                stale.push(id.clone());
                false
            } else {
                true
            }
        });
        stale
    }

    fn evict_expired_pending(&self) {
        self.pending
            .retain(|_, entry| entry.registered_at.elapsed() < PENDING_TIMEOUT);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        self.outbound.send(message)
    }
}

/// Concurrent registry of active sessions, keyed by opaque session id.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            idle_timeout,
        })
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn get_or_create(
        &self,
        session_id: &str,
        make_outbound: impl FnOnce() -> Arc<dyn OutboundSink>,
        client_headers: HashMap<String, String>,
    ) -> Arc<Session> {
        if let Some(existing) = self.get(session_id) {
            return existing;
        }
        let session = Arc::new(Session::new(session_id, make_outbound(), client_headers));
        self.sessions
            .insert(session_id.to_string(), session.clone());
        info!(session_id, active = self.sessions.len(), "session created");
        session
    }

    pub fn retire(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            info!(
                session_id,
                active = self.sessions.len(),
                "session retired"
            );
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Broadcast a notification to every active session's outbound
    /// transport. A send failure retires only the failing session; it
    /// does not interrupt delivery to the rest.
    pub fn broadcast(&self, notification: JSONRPCMessage) {
        let targets: Vec<(String, Arc<Session>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (session_id, session) in targets {
            if let Err(err) = session.send(notification.clone()) {
                warn!(session_id, %err, "dropping session after broadcast failure");
                self.retire(&session_id);
            }
        }
    }

    /// Spawn the idle-session reaper. Mirrors the id-translator's
    /// background eviction task shape, applied to whole sessions instead
    /// of individual id mappings.
    pub fn spawn_idle_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICTION_INTERVAL);
            loop {
                interval.tick().await;
                manager.reap_idle();
            }
        })
    }

    fn reap_idle(&self) {
        let idle_timeout = self.idle_timeout;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_for() >= idle_timeout)
            .map(|e| e.key().clone())
            .collect();
        for session_id in expired {
            debug!(session_id, "reaping idle session");
            self.retire(&session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<JSONRPCMessage>>,
        fail: bool,
    }

    impl OutboundSink for RecordingSink {
        fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
            if self.fail {
                return Err(GatewayError::transport("queue full"));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn sink(fail: bool) -> Arc<dyn OutboundSink> {
        Arc::new(RecordingSink {
            sent: Mutex::new(Vec::new()),
            fail,
        })
    }

    #[test]
    fn register_and_resolve_pending_round_trips() {
        let session = Session::new("s1", sink(false), HashMap::new());
        let req = JSONRPCMessage::request(MessageId::Number(1), "tools/call", None);
        session.register_pending(req, 0).unwrap();
        assert_eq!(session.pending_count(), 1);

        let resolved = session.resolve_pending(&MessageId::Number(1));
        assert!(resolved.is_some());
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn resolving_unknown_id_is_none_not_error() {
        let session = Session::new("s1", sink(false), HashMap::new());
        assert!(session.resolve_pending(&MessageId::Number(99)).is_none());
    }

    #[test]
    fn drain_stale_pending_only_drops_entries_older_than_current_generation() {
        let session = Session::new("s1", sink(false), HashMap::new());
        session
            .register_pending(JSONRPCMessage::request(MessageId::Number(1), "x", None), 0)
            .unwrap();
        session
            .register_pending(JSONRPCMessage::request(MessageId::Number(2), "y", None), 1)
            .unwrap();

        let stale = session.drain_stale_pending(1);

        assert_eq!(stale, vec![MessageId::Number(1)]);
        assert_eq!(session.pending_count(), 1);
        assert!(session.resolve_pending(&MessageId::Number(2)).is_some());
    }

    #[test]
    fn auth_headers_filters_by_key_substring() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer x".to_string());
        headers.insert("X-Api-Key".to_string(), "abc".to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let session = Session::new("s1", sink(false), headers);
        let auth = session.auth_headers();
        assert_eq!(auth.len(), 2);
        assert!(!auth.contains_key("Content-Type"));
    }

    #[test]
    fn session_manager_creates_once_and_broadcasts() {
        let manager = SessionManager::new(Duration::from_secs(300));
        let s = manager.get_or_create("a", || sink(false), HashMap::new());
        let same = manager.get_or_create("a", || sink(false), HashMap::new());
        assert!(Arc::ptr_eq(&s, &same));
        assert_eq!(manager.active_count(), 1);

        manager.broadcast(JSONRPCMessage::notification("notifications/reconnected", None));
        manager.retire("a");
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn broadcast_retires_only_failing_session() {
        let manager = SessionManager::new(Duration::from_secs(300));
        manager.get_or_create("good", || sink(false), HashMap::new());
        manager.get_or_create("bad", || sink(true), HashMap::new());

        manager.broadcast(JSONRPCMessage::notification("ping", None));
        assert!(manager.get("good").is_some());
        assert!(manager.get("bad").is_none());
    }
}
