//! Composition root: builds the downstream, the session manager, the
//! router, and the axum server for whichever output transport was
//! selected, then drives them until shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use dashmap::DashMap;
use mcpgate_core::error::{GatewayError, GatewayResult};
use mcpgate_core::jsonrpc::{JSONRPCMessage, MessageId};
use mcpgate_core::session::{OutboundSink, SessionManager};
use mcpgate_openapi::{document, synthesize_tools};
use mcpgate_router::{ChildSupervisor, ChildSupervisorConfig, Downstream, RemoteDownstream, Router, RouterMetrics};
use mcpgate_transport::header_policy::merge_headers;
use mcpgate_transport::sink::{ChannelSink, DEFAULT_SEND_QUEUE_BOUND};
use mcpgate_transport::sse::{self, SseClientTransport, SseOutboundSink};
use mcpgate_transport::stdio::GatewayStdioTransport;
use mcpgate_transport::streamable_http;
use mcpgate_transport::websocket;
use mcpgate_transport::Transport;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DownstreamConfig, GatewayConfig, OutputTransportConfig};
use crate::openapi_downstream::OpenApiDownstream;
use crate::shutdown::wait_for_shutdown_signal;

pub struct Gateway {
    config: Arc<GatewayConfig>,
    sessions: Arc<SessionManager>,
    router: Arc<Router>,
    downstream: Arc<dyn Downstream>,
    openapi_bridge: Option<Arc<OpenApiDownstream>>,
}

impl Gateway {
    pub async fn build(config: Arc<GatewayConfig>) -> GatewayResult<Self> {
        let sessions = SessionManager::new(config.idle_timeout);
        sessions.spawn_idle_reaper();
        let metrics = Arc::new(RouterMetrics::default());

        let (downstream, openapi_bridge): (Arc<dyn Downstream>, Option<Arc<OpenApiDownstream>>) =
            match &config.downstream {
                DownstreamConfig::Stdio {
                    command,
                    working_directory,
                } => {
                    let supervisor = ChildSupervisor::new(
                        ChildSupervisorConfig {
                            command: command.clone(),
                            working_directory: working_directory
                                .as_ref()
                                .map(|p| p.to_string_lossy().to_string()),
                            max_reconnect_attempts: config.max_reconnect_attempts,
                            ..Default::default()
                        },
                        metrics.clone(),
                    );
                    supervisor.start();
                    (supervisor as Arc<dyn Downstream>, None)
                }
                DownstreamConfig::Sse { url } => {
                    let transport =
                        SseClientTransport::connect(url, config.extra_headers.clone()).await?;
                    (Arc::new(RemoteDownstream::new(Arc::new(transport))), None)
                }
                DownstreamConfig::Api {
                    path_or_url,
                    api_host,
                    api_template,
                } => {
                    let loaded = if path_or_url.starts_with("http://") || path_or_url.starts_with("https://")
                    {
                        document::load_from_url(path_or_url).await?
                    } else {
                        document::load_from_file(std::path::Path::new(path_or_url))?
                    };
                    let mut tools = match loaded {
                        document::LoadedDocument::OpenApi(spec) => synthesize_tools(&spec),
                        document::LoadedDocument::Template(value) => value
                            .get("tools")
                            .cloned()
                            .and_then(|v| serde_json::from_value(v).ok())
                            .unwrap_or_default(),
                    };
                    if let Some(template_path) = api_template {
                        let content = std::fs::read_to_string(template_path).map_err(GatewayError::Io)?;
                        let template: serde_json::Value = serde_json::from_str(&content)
                            .map_err(|e| GatewayError::configuration(format!("invalid --apiTemplate file: {e}")))?;
                        tools = mcpgate_openapi::apply_template(tools, &template);
                    }
                    let api_host = api_host.clone().ok_or_else(|| {
                        GatewayError::configuration("--apiHost is required when bridging --api")
                    })?;
                    let bridge = OpenApiDownstream::new(
                        tools,
                        api_host,
                        config.tool_timeout_ms,
                        config.extra_headers.clone(),
                    );
                    (bridge.clone() as Arc<dyn Downstream>, Some(bridge))
                }
            };

        let router = Router::new(downstream.clone(), sessions.clone(), metrics);
        tokio::spawn(router.clone().pump());

        Ok(Gateway {
            config,
            sessions,
            router,
            downstream,
            openapi_bridge,
        })
    }

    /// Runs the selected output transport until an operator termination
    /// signal arrives, then drives the shutdown handshake: notify the
    /// downstream, give it a moment to exit cleanly, and return so the
    /// listener and every open transport drop with the process.
    pub async fn run(self) -> GatewayResult<()> {
        let downstream = self.downstream.clone();
        let serve = async move {
            match self.config.output_transport {
                OutputTransportConfig::Stdio => self.run_stdio().await,
                _ => self.run_http().await,
            }
        };

        tokio::select! {
            result = serve => result,
            _ = wait_for_shutdown_signal() => {
                info!("shutdown signal received, notifying downstream");
                downstream.shutdown().await;
                Ok(())
            }
        }
    }

    async fn run_stdio(self) -> GatewayResult<()> {
        let inbound = GatewayStdioTransport::new();
        let (sink, mut outbound_rx) = ChannelSink::new(DEFAULT_SEND_QUEUE_BOUND);
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(message) = outbound_rx.recv().await {
                let Ok(line) = message.to_line() else { continue };
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.write_all(b"\n").await.is_err() || stdout.flush().await.is_err() {
                    break;
                }
            }
        });

        let session = self.sessions.get_or_create(
            "stdio",
            || Arc::new(sink) as Arc<dyn OutboundSink>,
            HashMap::new(),
        );

        loop {
            match inbound.recv().await? {
                Some(message) if message.id().is_some() => {
                    if let Err(err) = self.router.forward_request(&session, message).await {
                        warn!(%err, "failed forwarding stdio request downstream");
                    }
                }
                Some(notification) => {
                    if let Err(err) = self.router.forward_notification(notification).await {
                        warn!(%err, "failed forwarding stdio notification downstream");
                    }
                }
                None => {
                    info!("stdin closed, shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn run_http(self) -> GatewayResult<()> {
        let state = Arc::new(AppState {
            sessions: self.sessions.clone(),
            router: self.router.clone(),
            config: self.config.clone(),
            openapi_bridge: self.openapi_bridge.clone(),
            http_sinks: Arc::new(DashMap::new()),
        });

        let mut app = axum::Router::new();
        for path in &self.config.health_endpoints {
            app = app.route(path, get(health_handler));
        }
        if state.openapi_bridge.is_some() {
            app = app.route("/mcp-config", get(mcp_config_handler));
        }

        app = match self.config.output_transport {
            OutputTransportConfig::Sse => app
                .route(&self.config.sse_path, get(sse_connect_handler))
                .route(&self.config.message_path, post(sse_message_handler)),
            OutputTransportConfig::Ws => app.route("/ws", get(ws_upgrade_handler)),
            OutputTransportConfig::StreamableHttp => {
                app.route(&self.config.http_path, post(streamable_http_handler))
            }
            OutputTransportConfig::Stdio => unreachable!("handled by run_stdio"),
        };

        let app = app.layer(self.config.cors.to_layer()).with_state(state);

        let addr = format!("0.0.0.0:{}", self.config.port);
        info!(%addr, transport = ?self.config.output_transport, "gateway listening");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(GatewayError::Io)?;
        axum::serve(listener, app).await.map_err(GatewayError::Io)?;
        Ok(())
    }
}

struct AppState {
    sessions: Arc<SessionManager>,
    router: Arc<Router>,
    config: Arc<GatewayConfig>,
    openapi_bridge: Option<Arc<OpenApiDownstream>>,
    http_sinks: Arc<DashMap<String, Arc<HttpReplyOutboundSink>>>,
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn mcp_config_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.openapi_bridge {
        Some(bridge) => Json(bridge.resolved_template()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(serde::Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn sse_connect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session_id = Uuid::new_v4().to_string();
    let client_headers = streamable_http::headers_to_map(&headers);
    let (sender, receiver) = sse::new_session_channel();
    state.sessions.get_or_create(
        &session_id,
        || Arc::new(SseOutboundSink::new(sender)) as Arc<dyn OutboundSink>,
        client_headers,
    );
    let message_endpoint = message_endpoint_url(&state.config, &session_id);
    sse::build_event_stream(receiver, session_id, message_endpoint)
}

/// Joins the configured public `--baseUrl` (when set) with the message
/// path to give the client an absolute URL to POST back to; falls back
/// to a path relative to the SSE connection when no base URL is
/// advertised.
fn message_endpoint_url(config: &GatewayConfig, session_id: &str) -> String {
    match &config.base_url {
        Some(base) => format!(
            "{}{}?sessionId={session_id}",
            base.trim_end_matches('/'),
            config.message_path
        ),
        None => format!("{}?sessionId={session_id}", config.message_path),
    }
}

async fn sse_message_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let client_headers = streamable_http::headers_to_map(&headers);
    let active = state.sessions.list();
    let Some(session_id) = sse::resolve_session_id(
        query.session_id.as_deref(),
        &client_headers,
        active.first().map(String::as_str),
        state.config.strict_sessions,
    ) else {
        return (StatusCode::BAD_REQUEST, "no active session").into_response();
    };
    let Some(session) = state.sessions.get(&session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    let Some(Ok(message)) = JSONRPCMessage::parse_line(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid JSON-RPC message").into_response();
    };
    let result = if message.id().is_some() {
        state.router.forward_request(&session, message).await
    } else {
        state.router.forward_notification(message).await
    };
    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => (StatusCode::BAD_GATEWAY, err.sanitize()).into_response(),
    }
}

async fn ws_upgrade_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = streamable_http::extract_or_generate_session_id(&headers);
    let client_headers = streamable_http::headers_to_map(&headers);
    ws.on_upgrade(move |socket| async move {
        let (transport, sink) = websocket::split_socket(socket);
        let session = state.sessions.get_or_create(
            &session_id,
            || Arc::new(sink) as Arc<dyn OutboundSink>,
            client_headers,
        );
        loop {
            match transport.recv().await {
                Ok(Some(message)) if message.id().is_some() => {
                    if let Err(err) = state.router.forward_request(&session, message).await {
                        warn!(%err, "failed forwarding websocket request downstream");
                    }
                }
                Ok(Some(notification)) => {
                    let _ = state.router.forward_notification(notification).await;
                }
                Ok(None) | Err(_) => break,
            }
        }
        state.sessions.retire(&session_id);
    })
}

/// Each Streamable HTTP POST owns exactly one outstanding id; its
/// response is delivered here through a one-shot channel rather than
/// the bounded queue the streaming adapters use, since there is no
/// standing connection to push onto between requests.
struct HttpReplyOutboundSink {
    pending: DashMap<MessageId, oneshot::Sender<JSONRPCMessage>>,
}

impl HttpReplyOutboundSink {
    fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    fn register(&self, id: MessageId) -> oneshot::Receiver<JSONRPCMessage> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }
}

impl OutboundSink for HttpReplyOutboundSink {
    fn send(&self, message: JSONRPCMessage) -> GatewayResult<()> {
        if let Some(id) = message.id() {
            if let Some((_, tx)) = self.pending.remove(id) {
                let _ = tx.send(message);
            }
        }
        Ok(())
    }
}

async fn streamable_http_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let session_id = streamable_http::extract_or_generate_session_id(&headers);
    let client_headers = merge_headers(&[&state.config.extra_headers, &streamable_http::headers_to_map(&headers)]);

    let sink = state
        .http_sinks
        .entry(session_id.clone())
        .or_insert_with(|| Arc::new(HttpReplyOutboundSink::new()))
        .clone();
    let session = state.sessions.get_or_create(
        &session_id,
        || sink.clone() as Arc<dyn OutboundSink>,
        client_headers,
    );

    let Some(Ok(message)) = JSONRPCMessage::parse_line(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid JSON-RPC message").into_response();
    };

    let mut response_headers = HeaderMap::new();
    if streamable_http::apply_session_headers(&mut response_headers, &session_id).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let Some(id) = message.id().cloned() else {
        let _ = state.router.forward_notification(message).await;
        return (StatusCode::ACCEPTED, response_headers).into_response();
    };

    let reply_rx = sink.register(id);
    if let Err(err) = state.router.forward_request(&session, message).await {
        return (StatusCode::BAD_GATEWAY, response_headers, err.sanitize()).into_response();
    }

    match tokio::time::timeout(Duration::from_millis(state.config.tool_timeout_ms.max(30_000)), reply_rx).await {
        Ok(Ok(response)) => {
            let body = response.to_line().unwrap_or_default();
            (StatusCode::OK, response_headers, body).into_response()
        }
        _ => (StatusCode::GATEWAY_TIMEOUT, response_headers, "timed out waiting for downstream").into_response(),
    }
}
