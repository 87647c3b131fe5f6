//! Command-line argument definitions for the gateway binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// mcpgate - protocol-translation gateway for the Model Context Protocol.
///
/// Bridges a single downstream (a spawned stdio child, a remote SSE
/// server, or a synthesized OpenAPI bridge) to one or more upstream
/// client transports, fanning notifications out to every connected
/// session and correlating responses back to the session that asked.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcpgate", version, about, long_about = None)]
pub struct CliArgs {
    /// Spawn a child process and speak line-framed JSON-RPC over its stdio
    #[arg(long, value_name = "COMMAND", group = "downstream")]
    pub stdio: Option<String>,

    /// Connect to a remote MCP server over Server-Sent Events
    #[arg(long, value_name = "URL", group = "downstream")]
    pub sse: Option<String>,

    /// Bridge an OpenAPI document (or ready MCP template) as the downstream
    #[arg(long, value_name = "PATH_OR_URL", group = "downstream")]
    pub api: Option<String>,

    /// Base URL the OpenAPI bridge issues outbound tool calls against
    #[arg(long = "apiHost", value_name = "URL", requires = "api")]
    pub api_host: Option<String>,

    /// Overlay template file patched onto the tools synthesized from `--api`
    #[arg(long = "apiTemplate", value_name = "PATH", requires = "api")]
    pub api_template: Option<PathBuf>,

    /// Upstream transport exposed to clients
    #[arg(long = "outputTransport", value_enum, default_value_t = OutputTransport::Stdio)]
    pub output_transport: OutputTransport,

    /// Port to bind for HTTP-based output transports
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Public base URL advertised to clients (used in relative-URL joins)
    #[arg(long = "baseUrl", value_name = "URL")]
    pub base_url: Option<String>,

    /// Path the SSE event stream is served on
    #[arg(long = "ssePath", default_value = "/sse")]
    pub sse_path: String,

    /// Path SSE clients POST inbound messages to
    #[arg(long = "messagePath", default_value = "/message")]
    pub message_path: String,

    /// Path the Streamable HTTP transport is served on
    #[arg(long = "httpPath", default_value = "/mcp")]
    pub http_path: String,

    /// Extra header to attach to every outbound request, "Key: Value" (repeatable)
    #[arg(long = "header", value_name = "K: V")]
    pub headers: Vec<String>,

    /// Shorthand for `--header "Authorization: Bearer <token>"`
    #[arg(long = "oauth2Bearer", value_name = "TOKEN")]
    pub oauth2_bearer: Option<String>,

    /// CORS policy: omit for disabled, a bare flag for any-origin, or a
    /// comma-separated origin list
    #[arg(long, value_name = "ORIGINS", num_args = 0..=1, default_missing_value = "*")]
    pub cors: Option<String>,

    /// Additional path that answers `200 OK` for liveness probes (repeatable)
    #[arg(long = "healthEndpoint", value_name = "PATH")]
    pub health_endpoints: Vec<String>,

    /// Minimum log level emitted by the tracing subscriber
    #[arg(long = "logLevel", default_value = "info", env = "MCPGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Log output encoding
    #[arg(long = "logFormat", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Seconds of inactivity before a session is evicted
    #[arg(long = "idleTimeout", default_value_t = 300)]
    pub idle_timeout: u64,

    /// Per-call timeout in milliseconds for OpenAPI-bridged tool invocations
    #[arg(long = "toolTimeout", default_value_t = mcpgate_openapi::DEFAULT_TOOL_TIMEOUT_MS)]
    pub tool_timeout: u64,

    /// Maximum consecutive child-process reconnect attempts before giving up
    #[arg(long = "maxReconnectAttempts", default_value_t = 10)]
    pub max_reconnect_attempts: u32,

    /// Force the single-active-session SSE fallback even with no prior
    /// concurrent-session observation
    #[arg(long = "strictSessions")]
    pub strict_sessions: bool,

    /// Working directory for the spawned child process (`--stdio` only)
    #[arg(long, value_name = "DIR", requires = "stdio")]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum OutputTransport {
    Stdio,
    Sse,
    Ws,
    StreamableHttp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl CliArgs {
    /// Enforces the exclusive-or among `--stdio`/`--sse`/`--api` that clap's
    /// `group` attribute alone cannot express as "exactly one, required".
    pub fn validate(&self) -> Result<(), String> {
        let selected = [self.stdio.is_some(), self.sse.is_some(), self.api.is_some()]
            .iter()
            .filter(|b| **b)
            .count();
        if selected != 1 {
            return Err(
                "exactly one of --stdio, --sse, or --api must be provided".to_string(),
            );
        }
        Ok(())
    }

    pub fn parsed_headers(&self) -> Result<Vec<(String, String)>, String> {
        let mut out = Vec::new();
        for raw in &self.headers {
            let (k, v) = raw
                .split_once(':')
                .ok_or_else(|| format!("invalid --header value (expected \"K: V\"): {raw}"))?;
            out.push((k.trim().to_string(), v.trim().to_string()));
        }
        if let Some(token) = &self.oauth2_bearer {
            out.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        Ok(out)
    }
}
