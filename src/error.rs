//! Errors raised while configuring and starting Secure Fetch.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Secure Fetch operations
pub type Result<T> = std::result::Result<T, SecureFetchError>;

/// Errors raised while setting up Secure Fetch (configuration, startup).
///
/// Errors that happen while fetching are reported through
/// [`crate::fetch::FetchError`] instead, because they end up inside the tool
/// result rather than aborting anything.
#[derive(Error, Debug)]
pub enum SecureFetchError {
    #[error("Failed to read configuration file {path}: {source}")]
    /// The configuration file could not be read.
    ConfigRead {
        /// The path that was read.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    /// The configuration file is not valid TOML for [`crate::AppConfig`].
    ConfigParse {
        /// The path that was parsed.
        path: PathBuf,
        /// The underlying TOML error.
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for environment variable {name}: {reason}")]
    /// An environment override could not be interpreted.
    InvalidEnv {
        /// The variable name.
        name: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    #[error("Invalid allowlist entry {0:?}")]
    /// An allowlist entry looks like a CIDR range but is malformed.
    InvalidAllowlistEntry(String),

    #[error("Failed to build HTTP client: {0}")]
    /// The outbound HTTP client could not be constructed.
    HttpClient(#[from] reqwest::Error),
}
