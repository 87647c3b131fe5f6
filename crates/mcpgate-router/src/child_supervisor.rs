//! Spawns, monitors, and reconnects the downstream child process.
//!
//! The state machine and its transitions are generalized from the
//! child-process transport's spawn/stop lifecycle: this module adds the
//! reconnect-with-backoff and terminal-failure behavior the transport
//! itself does not attempt, plus a uniform inbound stream that carries
//! both the child's own JSON-RPC traffic and the supervisor's own
//! synthetic notifications (`notifications/reconnected`, stderr errors).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::{JSONRPCMessage, JsonRpcErrorCode};
use mcpgate_transport::stdio::ChildProcessTransport;
use mcpgate_transport::Transport;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tracing::{error, info, warn};

use crate::metrics::RouterMetrics;

/// A synthetic notification carrying a JSON-RPC error code/message pair,
/// used for child-process failures that have no request id of their own
/// to ride back as a response. Broadcast to every session rather than
/// routed to one, since no caller owns the failure.
fn child_error_notification(code: JsonRpcErrorCode, message: impl Into<String>) -> JSONRPCMessage {
    JSONRPCMessage::notification(
        "notifications/message",
        Some(serde_json::json!({
            "code": code.code(),
            "message": message.into(),
        })),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    NotStarted,
    Starting,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChildSupervisorConfig {
    pub command: String,
    pub working_directory: Option<String>,
    pub readiness_timeout: Duration,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub max_reconnect_attempts: u32,
    pub shutdown_grace: Duration,
}

impl Default for ChildSupervisorConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            working_directory: None,
            readiness_timeout: Duration::from_secs(120),
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

/// Supervises exactly one logical child process across its whole
/// lifetime, including any number of respawns.
pub struct ChildSupervisor {
    config: ChildSupervisorConfig,
    state: std::sync::Mutex<ChildState>,
    current: RwLock<Option<Arc<ChildProcessTransport>>>,
    reconnect_attempts: AtomicU32,
    /// Bumped on every successful (re)spawn; used by the router to know
    /// which pending entries predate the current incarnation.
    generation: AtomicU64,
    inbound_tx: mpsc::Sender<JSONRPCMessage>,
    inbound_rx: AsyncMutex<mpsc::Receiver<JSONRPCMessage>>,
    metrics: Arc<RouterMetrics>,
}

impl ChildSupervisor {
    pub fn new(config: ChildSupervisorConfig, metrics: Arc<RouterMetrics>) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        Arc::new(Self {
            config,
            state: std::sync::Mutex::new(ChildState::NotStarted),
            current: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            metrics,
        })
    }

    pub fn state(&self) -> ChildState {
        *self.state.lock().expect("child state poisoned")
    }

    fn set_state(&self, state: ChildState) {
        *self.state.lock().expect("child state poisoned") = state;
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Spawn the child and start the supervising task that owns its
    /// entire reconnect lifecycle. Returns once the first spawn attempt
    /// has been issued; readiness happens asynchronously.
    pub fn start(self: &Arc<Self>) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.run().await;
        });
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(ChildState::Starting);
            match ChildProcessTransport::spawn(
                &self.config.command,
                self.config.working_directory.as_deref(),
            )
            .await
            {
                Ok(transport) => {
                    let transport = Arc::new(transport);
                    *self.current.write().await = Some(transport.clone());
                    self.await_readiness(&transport).await;
                    self.set_state(ChildState::Ready);
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    if self.reconnect_attempts.swap(0, Ordering::SeqCst) > 0 {
                        self.metrics.record_reconnect();
                        let _ = self
                            .inbound_tx
                            .send(JSONRPCMessage::notification(
                                "notifications/reconnected",
                                None,
                            ))
                            .await;
                    }
                    self.pump_until_exit(&transport).await;
                }
                Err(err) => {
                    warn!(%err, "failed to spawn child process");
                }
            }

            self.set_state(ChildState::Failed);
            *self.current.write().await = None;

            let attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempts > self.config.max_reconnect_attempts {
                error!(attempts, "child process exhausted reconnect attempts");
                let _ = self
                    .inbound_tx
                    .send(child_error_notification(
                        JsonRpcErrorCode::DownstreamRestarted,
                        format!("Child process failed after {attempts} reconnect attempts"),
                    ))
                    .await;
                return;
            }

            let delay = self.backoff_delay(attempts);
            info!(attempts, ?delay, "scheduling child process restart");
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.config.initial_backoff.as_millis() as f64 * multiplier) as u64;
        Duration::from_millis(millis).min(self.config.max_backoff)
    }

    /// The child is considered ready on the first parseable JSON message
    /// or once the readiness timeout elapses, whichever comes first; a
    /// silent but alive child is not a failure.
    async fn await_readiness(&self, transport: &Arc<ChildProcessTransport>) {
        let result = tokio::time::timeout(self.config.readiness_timeout, transport.recv()).await;
        match result {
            Ok(Ok(Some(message))) => {
                let _ = self.inbound_tx.send(message).await;
            }
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {}
        }
    }

    async fn pump_until_exit(&self, transport: &Arc<ChildProcessTransport>) {
        loop {
            tokio::select! {
                message = transport.recv() => {
                    match message {
                        Ok(Some(message)) => {
                            if self.inbound_tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(err) => {
                            warn!(%err, "child transport receive error");
                            return;
                        }
                    }
                }
                stderr_line = transport.recv_stderr() => {
                    if let Some(line) = stderr_line {
                        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&line) {
                            let _ = self.inbound_tx.send(child_error_notification(
                                JsonRpcErrorCode::ChildProcessError,
                                format!("Child process error: {parsed}"),
                            )).await;
                        }
                    }
                }
            }
            if !transport.is_alive().await {
                return;
            }
        }
    }

    pub async fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        let guard = self.current.read().await;
        match guard.as_ref() {
            Some(transport) => transport.send(message).await,
            None => Err(GatewayError::transport("child process not ready")),
        }
    }

    pub async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }

    /// Shutdown handshake: notify, wait, then terminate the process.
    pub async fn shutdown(&self) {
        if let Some(transport) = self.current.read().await.as_ref() {
            let _ = transport
                .send(JSONRPCMessage::notification("shutdown", None))
                .await;
            let _ = transport.stop(self.config.shutdown_grace).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_by_multiplier_up_to_cap() {
        let config = ChildSupervisorConfig::default();
        let metrics = Arc::new(RouterMetrics::default());
        let supervisor = ChildSupervisor::new(config, metrics);
        assert_eq!(supervisor.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(supervisor.backoff_delay(2), Duration::from_millis(1500));
        assert!(supervisor.backoff_delay(20) <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn starts_in_not_started_state() {
        let config = ChildSupervisorConfig::default();
        let metrics = Arc::new(RouterMetrics::default());
        let supervisor = ChildSupervisor::new(config, metrics);
        assert_eq!(supervisor.state(), ChildState::NotStarted);
    }

    #[tokio::test]
    async fn reconnects_and_becomes_ready_with_a_real_command() {
        let config = ChildSupervisorConfig {
            command: "cat".to_string(),
            ..Default::default()
        };
        let metrics = Arc::new(RouterMetrics::default());
        let supervisor = ChildSupervisor::new(config, metrics);
        supervisor.start();

        for _ in 0..50 {
            if supervisor.state() == ChildState::Ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(supervisor.state(), ChildState::Ready);
        supervisor.shutdown().await;
    }
}
