//! Graceful shutdown signal handling.
//!
//! Resolves once an operator-initiated termination signal arrives, so the
//! caller can run the notify/wait/terminate handshake (child process,
//! HTTP listener, open transports) instead of dying mid-request.

use tokio::signal;

/// Waits for either Ctrl-C or, on Unix, SIGTERM. Never resolves on other
/// platforms' SIGTERM equivalent since only Unix exposes one to Tokio.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sigterm) = signal::unix::signal(signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
