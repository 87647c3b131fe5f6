//! Lock-free counters shared by the supervisor and router. Readers take a
//! consistent snapshot without contending with the hot send/receive path.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct RouterMetrics {
    messages_forwarded: AtomicU64,
    messages_broadcast: AtomicU64,
    stale_responses_dropped: AtomicU64,
    reconnects: AtomicU64,
    sessions_retired: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    pub messages_forwarded: u64,
    pub messages_broadcast: u64,
    pub stale_responses_dropped: u64,
    pub reconnects: u64,
    pub sessions_retired: u64,
}

impl RouterMetrics {
    pub fn record_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_response(&self) {
        self.stale_responses_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_retired(&self) {
        self.sessions_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            messages_broadcast: self.messages_broadcast.load(Ordering::Relaxed),
            stale_responses_dropped: self.stale_responses_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            sessions_retired: self.sessions_retired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = RouterMetrics::default();
        metrics.record_forwarded();
        metrics.record_forwarded();
        metrics.record_stale_response();
        let snap = metrics.snapshot();
        assert_eq!(snap.messages_forwarded, 2);
        assert_eq!(snap.stale_responses_dropped, 1);
    }
}
