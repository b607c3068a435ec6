#![warn(missing_docs)] // Enforce documentation for all public items

//! `secure-fetch` is the core library behind the `secure-fetch-mcp` server.
//!
//! It provides the foundational components for:
//! - Configuration management (`config`)
//! - Classifying addresses and enforcing the egress allowlist (`network`)
//! - Performing pinned, redirect-checked HTTP requests (`fetch`)
//! - Error handling (`error`)
//!
//! ## Overview
//!
//! Every outbound request is resolved up front, each resolved address is checked
//! against the internal-address block and the operator allowlist, and the
//! connection is pinned to the address that was checked. Redirects are followed
//! manually so every hop goes through the same check.
//!
//! Key modules to explore:
//! - `network::guard`: the per-hop egress check.
//! - `fetch::client`: the redirect loop.
//! - `config`: loading configuration from TOML and the environment.

pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod network;

pub use config::{load_config, AppConfig, FetchConfig, ServerConfig, Transport};
pub use error::{Result, SecureFetchError};
pub use fetch::{FetchError, FetchOutcome, FetchRequest, Fetcher};
pub use network::{Allowlist, EgressGuard, HostResolver, ResolvedTarget, SystemResolver};
