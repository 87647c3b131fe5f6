//! mcpgate CLI entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcpgate_cli::args::{self, CliArgs};
use mcpgate_cli::config::GatewayConfig;
use mcpgate_cli::wiring;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match GatewayConfig::resolve(&args) {
        Ok(config) => Arc::new(config),
        Err(message) => {
            eprintln!("configuration error: {message}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if let Err(err) = run(config).await {
        eprintln!("mcpgate exited with an error: {}", err.sanitize());
        std::process::exit(1);
    }
}

async fn run(config: Arc<GatewayConfig>) -> mcpgate_core::error::GatewayResult<()> {
    wiring::Gateway::build(config).await?.run().await
}

/// Logs always go to stderr, never stdout: the `--stdio` output transport
/// uses stdout as the MCP protocol channel itself, so anything written
/// there that is not a framed JSON-RPC message would corrupt the stream.
fn init_tracing(config: &GatewayConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        args::LogFormat::Json => builder.json().init(),
        args::LogFormat::Pretty => builder.init(),
    }
}
