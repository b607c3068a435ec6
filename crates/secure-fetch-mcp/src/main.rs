use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use secure_fetch::{load_config, AppConfig, Transport};
use secure_fetch_mcp::http_transport::run_http_server;
use secure_fetch_mcp::server::Server;

const DEFAULT_LOG_FILTER: &str = "secure_fetch=info,secure_fetch_mcp=info,tower_http=info";

/// MCP server exposing an SSRF-guarded `fetch_url` tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Path to a config.toml (defaults are used when omitted)
    #[arg(short, long, env = "SECURE_FETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind, overrides MCP_HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides MCP_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Transport to serve: http (streamable HTTP) or stdio
    #[arg(short, long)]
    transport: Option<Transport>,

    /// Extra allowlist entries (hostname, IP or CIDR), appended to the configured ones
    #[arg(long = "allow")]
    allow: Vec<String>,
}

impl CliArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        config.fetch.allowlist.extend(self.allow);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_process_env()
        .context("Failed to apply environment overrides")?;
    args.apply(&mut config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = %config.server.transport,
        allowlist = ?config.fetch.allowlist,
        max_redirects = config.fetch.max_redirects,
        "Starting secure-fetch MCP server"
    );

    let server = Server::new(&config)?;

    let result = match config.server.transport {
        Transport::Http => run_http_server(config.server.bind_address(), server).await,
        Transport::Stdio => server.run_stdio().await,
    };

    if let Err(e) = result {
        error!(error = %e, "Server encountered an error");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = CliArgs::try_parse_from([
            "secure-fetch-mcp",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--transport",
            "stdio",
            "--allow",
            "10.0.0.0/8",
            "--allow",
            "internal.example",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        config.fetch.allowlist.push("192.168.1.5".to_string());
        args.apply(&mut config);

        assert_eq!(config.server.bind_address(), "127.0.0.1:9100");
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(
            config.fetch.allowlist,
            vec!["192.168.1.5", "10.0.0.0/8", "internal.example"]
        );
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let args = CliArgs::try_parse_from(["secure-fetch-mcp"]).unwrap();
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_streamable_http_alias() {
        let args =
            CliArgs::try_parse_from(["secure-fetch-mcp", "--transport", "streamable-http"]).unwrap();
        assert_eq!(args.transport, Some(Transport::Http));
    }
}
