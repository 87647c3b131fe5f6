//! Resolves parsed CLI arguments into an immutable `GatewayConfig`,
//! serializable for the `/mcp-config` introspection route.

use std::collections::HashMap;
use std::time::Duration;

use mcpgate_transport::header_policy::CorsConfig;
use serde::Serialize;

use crate::args::{CliArgs, LogFormat, OutputTransport};

#[derive(Debug, Clone)]
pub enum DownstreamConfig {
    Stdio {
        command: String,
        working_directory: Option<std::path::PathBuf>,
    },
    Sse {
        url: String,
    },
    Api {
        path_or_url: String,
        api_host: Option<String>,
        api_template: Option<std::path::PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputTransportConfig {
    Stdio,
    Sse,
    Ws,
    StreamableHttp,
}

impl From<OutputTransport> for OutputTransportConfig {
    fn from(value: OutputTransport) -> Self {
        match value {
            OutputTransport::Stdio => OutputTransportConfig::Stdio,
            OutputTransport::Sse => OutputTransportConfig::Sse,
            OutputTransport::Ws => OutputTransportConfig::Ws,
            OutputTransport::StreamableHttp => OutputTransportConfig::StreamableHttp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub downstream: DownstreamConfig,
    pub output_transport: OutputTransportConfig,
    pub port: u16,
    pub base_url: Option<String>,
    pub sse_path: String,
    pub message_path: String,
    pub http_path: String,
    pub extra_headers: HashMap<String, String>,
    pub cors: CorsConfig,
    pub health_endpoints: Vec<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub idle_timeout: Duration,
    pub tool_timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    pub strict_sessions: bool,
}

impl GatewayConfig {
    pub fn resolve(args: &CliArgs) -> Result<Self, String> {
        args.validate()?;

        let downstream = if let Some(command) = &args.stdio {
            DownstreamConfig::Stdio {
                command: command.clone(),
                working_directory: args.working_dir.clone(),
            }
        } else if let Some(url) = &args.sse {
            DownstreamConfig::Sse { url: url.clone() }
        } else if let Some(path_or_url) = &args.api {
            DownstreamConfig::Api {
                path_or_url: path_or_url.clone(),
                api_host: args.api_host.clone(),
                api_template: args.api_template.clone(),
            }
        } else {
            return Err("exactly one of --stdio, --sse, or --api must be provided".to_string());
        };

        let extra_headers: HashMap<String, String> =
            args.parsed_headers()?.into_iter().collect();

        let cors = match &args.cors {
            None => CorsConfig::AllowAny(false),
            Some(v) if v == "*" => CorsConfig::AllowAny(true),
            Some(v) if v.contains(',') => {
                CorsConfig::List(v.split(',').map(str::trim).map(str::to_string).collect())
            }
            Some(v) => CorsConfig::Single(v.clone()),
        };

        Ok(GatewayConfig {
            downstream,
            output_transport: args.output_transport.into(),
            port: args.port,
            base_url: args.base_url.clone(),
            sse_path: args.sse_path.clone(),
            message_path: args.message_path.clone(),
            http_path: args.http_path.clone(),
            extra_headers,
            cors,
            health_endpoints: args.health_endpoints.clone(),
            log_level: args.log_level.clone(),
            log_format: args.log_format,
            idle_timeout: Duration::from_secs(args.idle_timeout),
            tool_timeout_ms: args.tool_timeout,
            max_reconnect_attempts: args.max_reconnect_attempts,
            strict_sessions: args.strict_sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn resolves_stdio_downstream() {
        let args = CliArgs::try_parse_from(["mcpgate", "--stdio", "python server.py"]).unwrap();
        let config = GatewayConfig::resolve(&args).unwrap();
        assert!(matches!(config.downstream, DownstreamConfig::Stdio { .. }));
        assert_eq!(config.tool_timeout_ms, mcpgate_openapi::DEFAULT_TOOL_TIMEOUT_MS);
    }

    #[test]
    fn comma_separated_cors_becomes_a_list() {
        let args = CliArgs::try_parse_from([
            "mcpgate",
            "--stdio",
            "x",
            "--cors",
            "http://a.com,http://b.com",
        ])
        .unwrap();
        let config = GatewayConfig::resolve(&args).unwrap();
        assert!(matches!(config.cors, CorsConfig::List(ref v) if v.len() == 2));
    }

    #[test]
    fn missing_downstream_selection_is_rejected() {
        let args = CliArgs::try_parse_from(["mcpgate"]).unwrap();
        assert!(GatewayConfig::resolve(&args).is_err());
    }
}
