//! Application configuration.
//!
//! Configuration is layered: built-in defaults, then an optional `config.toml`,
//! then environment variables (`MCP_HOST`, `MCP_PORT`, `SECURE_FETCH_*`), and
//! finally command-line flags applied by the binaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_REDIRECTS, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, ENV_ALLOWLIST,
    ENV_MAX_REDIRECTS, ENV_MCP_HOST, ENV_MCP_PORT, ENV_TIMEOUT_SECS,
};
use crate::error::{Result, SecureFetchError};

/// How the MCP server talks to its client.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Streamable HTTP, stateless, JSON responses.
    #[default]
    #[serde(alias = "streamable-http")]
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => f.write_str("http"),
            Transport::Stdio => f.write_str("stdio"),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "streamable-http" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            other => Err(format!("unknown transport '{other}' (expected 'http' or 'stdio')")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Where and how the server listens.
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Transport used to serve MCP.
    #[serde(default)]
    pub transport: Transport,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: Transport::default(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Outbound request policy.
pub struct FetchConfig {
    /// Hostnames, IP literals or CIDR ranges that may be reached even though they are internal.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Redirect hops followed before the last 3xx response is returned as-is.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Timeout applied to each individual request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// `User-Agent` sent when the caller does not supply one.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            max_redirects: default_max_redirects(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_redirects() -> u32 {
    DEFAULT_MAX_REDIRECTS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    format!("secure-fetch/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
/// Top-level configuration.
pub struct AppConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Outbound request policy.
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl AppConfig {
    /// Applies overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`. Unset and empty values leave the current
    /// setting untouched.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(ENV_MCP_HOST) {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = get(ENV_MCP_PORT) {
            self.server.port = parse_env(ENV_MCP_PORT, &port)?;
        }
        if let Some(list) = get(ENV_ALLOWLIST) {
            self.fetch.allowlist = list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(max) = get(ENV_MAX_REDIRECTS) {
            self.fetch.max_redirects = parse_env(ENV_MAX_REDIRECTS, &max)?;
        }
        if let Some(timeout) = get(ENV_TIMEOUT_SECS) {
            self.fetch.request_timeout_secs = parse_env(ENV_TIMEOUT_SECS, &timeout)?;
        }

        debug!(config = ?self, "Applied environment overrides");
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| SecureFetchError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Loads configuration from `path`, or returns the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };

    let raw = fs::read_to_string(path).map_err(|source| SecureFetchError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AppConfig = toml::from_str(&raw).map_err(|source| SecureFetchError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}
