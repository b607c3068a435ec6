//! Outbound fetching with per-hop egress checks.

pub mod client;
pub mod outcome;
pub mod pinning;

pub use client::Fetcher;
pub use outcome::{FetchError, FetchOutcome, FetchRequest};
