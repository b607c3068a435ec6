use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::exit;
use tracing_subscriber::EnvFilter;

use secure_fetch::{load_config, FetchRequest, Fetcher};

/// Operator tool for the Secure Fetch egress policy.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Path to a config.toml (defaults are used when omitted)
    #[arg(short, long, global = true, env = "SECURE_FETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Extra allowlist entries (hostname, IP or CIDR), appended to the configured ones
    #[arg(long = "allow", global = true)]
    allow: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a URL through the egress guard and print the outcome as JSON
    Fetch {
        /// URL to fetch
        url: String,

        /// HTTP method
        #[arg(short = 'X', long = "method", default_value = "GET")]
        method: String,

        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Only run the egress check and show where the connection would go
    Check {
        /// URL to check
        url: String,
    },
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Header '{}' must look like 'Name: value'", raw))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the result
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_process_env()
        .context("Failed to apply environment overrides")?;
    config.fetch.allowlist.extend(args.allow);

    let fetcher = Fetcher::new(&config.fetch).context("Failed to initialize fetcher")?;

    match args.command {
        Command::Fetch { url, method, headers } => {
            let headers = headers
                .iter()
                .map(|h| parse_header(h))
                .collect::<Result<HashMap<_, _>>>()?;
            let request = FetchRequest {
                url,
                method,
                headers: (!headers.is_empty()).then_some(headers),
            };
            let outcome = fetcher.fetch(request).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Check { url } => match fetcher.check(&url).await {
            Ok(target) => {
                println!(
                    "{} {} -> {} ({})",
                    "allowed".green(),
                    target.host,
                    target.addr,
                    target.scheme
                );
            }
            Err(e) => {
                println!("{} {}", "refused".red(), e);
                exit(1);
            }
        },
    }

    Ok(())
}
