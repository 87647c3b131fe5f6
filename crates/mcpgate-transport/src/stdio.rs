//! Line-framed JSON over standard streams.
//!
//! Two shapes share the same framing rules (`CR?LF`-split reads, a
//! single-line-JSON-plus-`\n` write, unparseable lines silently dropped
//! as boot banners): a spawned child process's stdio pair, owned here and
//! driven by the supervisor in `mcpgate-router`, and the gateway's own
//! process stdio, used when the gateway itself is invoked as a child and
//! speaks MCP over its inherited stdin/stdout.

use std::process::Stdio as StdStdio;
use std::sync::Arc;

use async_trait::async_trait;
use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::JSONRPCMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::{Transport, TransportKind};

/// Default ceiling on a single framed line, matching the child-process
/// adapter's oversized-line protection.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Split a raw command string into an argv vector the way the child
/// supervisor invokes it: whitespace-run splitting, no shell involved.
pub fn split_command(command: &str) -> Vec<String> {
    command
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>()
}

/// A spawned child process exposed as a line-framed transport. Stdin
/// writes and stdout reads cross an `await` point, so both sides live
/// behind a `tokio::sync::Mutex`; process handle bookkeeping does not
/// need async-aware locking but is kept alongside for lifetime reasons.
pub struct ChildProcessTransport {
    child: AsyncMutex<Child>,
    stdin_tx: mpsc::Sender<String>,
    stdout_rx: AsyncMutex<mpsc::Receiver<JSONRPCMessage>>,
    stderr_rx: AsyncMutex<mpsc::Receiver<String>>,
}

impl ChildProcessTransport {
    pub async fn spawn(command: &str, working_directory: Option<&str>) -> GatewayResult<Self> {
        let argv = split_command(command);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GatewayError::configuration("empty child command"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(GatewayError::Io)?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let (stdout_tx, stdout_rx) = mpsc::channel::<JSONRPCMessage>(256);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.len() > MAX_LINE_BYTES {
                            warn!(len = line.len(), "dropping oversized stdout line");
                            continue;
                        }
                        match JSONRPCMessage::parse_line(&line) {
                            None => continue,
                            Some(Ok(message)) => {
                                if stdout_tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                debug!(%err, "ignoring unparseable stdout line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "stdout read error");
                        break;
                    }
                }
            }
        });

        let (stderr_tx, stderr_rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stderr_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child: AsyncMutex::new(child),
            stdin_tx,
            stdout_rx: AsyncMutex::new(stdout_rx),
            stderr_rx: AsyncMutex::new(stderr_rx),
        })
    }

    /// Drain one buffered stderr line, if any is ready without waiting.
    pub async fn try_recv_stderr(&self) -> Option<String> {
        self.stderr_rx.lock().await.try_recv().ok()
    }

    /// Await the next stderr line, for callers that want to block on it
    /// alongside other branches in a `tokio::select!`.
    pub async fn recv_stderr(&self) -> Option<String> {
        self.stderr_rx.lock().await.recv().await
    }

    /// True while the OS process has not exited.
    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    pub async fn stop(&self, shutdown_timeout: std::time::Duration) -> GatewayResult<()> {
        let mut child = self.child.lock().await;
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        if tokio::time::timeout(shutdown_timeout, child.wait())
            .await
            .is_err()
        {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for ChildProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ChildProcess
    }

    async fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        let line = message.to_line()?;
        self.stdin_tx
            .send(line)
            .await
            .map_err(|_| GatewayError::transport("child stdin closed"))
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        Ok(self.stdout_rx.lock().await.recv().await)
    }

    async fn close(&self) -> GatewayResult<()> {
        self.stop(std::time::Duration::from_secs(10)).await
    }
}

/// The gateway's own process stdio, used when the gateway is itself
/// invoked as a child and must speak MCP over its inherited handles.
pub struct GatewayStdioTransport {
    stdin_tx: mpsc::Sender<String>,
    stdout_rx: AsyncMutex<mpsc::Receiver<JSONRPCMessage>>,
}

impl GatewayStdioTransport {
    pub fn new() -> Arc<Self> {
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = stdin_rx.recv().await {
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdout.flush().await.is_err() {
                    break;
                }
            }
        });

        let (stdout_tx, stdout_rx) = mpsc::channel::<JSONRPCMessage>(256);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match JSONRPCMessage::parse_line(&line) {
                        None => continue,
                        Some(Ok(message)) => {
                            if stdout_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => debug!(%err, "ignoring unparseable stdin line"),
                    },
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "stdin read error");
                        break;
                    }
                }
            }
        });

        Arc::new(Self {
            stdin_tx,
            stdout_rx: AsyncMutex::new(stdout_rx),
        })
    }
}

#[async_trait]
impl Transport for GatewayStdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        let line = message.to_line()?;
        self.stdin_tx
            .send(line)
            .await
            .map_err(|_| GatewayError::transport("stdout closed"))
    }

    async fn recv(&self) -> GatewayResult<Option<JSONRPCMessage>> {
        Ok(self.stdout_rx.lock().await.recv().await)
    }

    async fn close(&self) -> GatewayResult<()> {
        Ok(())
    }
}
