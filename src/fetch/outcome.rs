//! Request, outcome and error types of a fetch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

use crate::constants::{STATUS_BLOCKED, STATUS_TRANSPORT_FAILURE};

fn default_method() -> String {
    "GET".to_string()
}

/// A fetch as requested by a caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Absolute `http`/`https` URL.
    pub url: String,
    /// HTTP method, case-insensitive.
    #[serde(default = "default_method")]
    pub method: String,
    /// Extra request headers. A `Host` entry is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl FetchRequest {
    /// A plain `GET` of `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: None,
        }
    }
}

/// Why a fetch did not produce an upstream response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    /// The URL (or a redirect target) could not be parsed.
    InvalidUrl(String),

    #[error("Scheme '{0}' is not allowed. Only http and https are permitted.")]
    /// Anything other than `http`/`https`.
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    /// The URL carries no host component.
    MissingHost(String),

    #[error("Could not resolve hostname: {0}")]
    /// DNS gave no usable answer.
    Unresolvable(String),

    #[error("IP {ip} is private/internal and not allowed")]
    /// The host resolved to an internal address that is not allowlisted.
    InternalAddress {
        /// The offending address.
        ip: IpAddr,
        /// The hostname that resolved to it.
        host: String,
    },

    #[error("Invalid HTTP method: {0}")]
    /// The method is not a valid HTTP token.
    InvalidMethod(String),

    #[error("Invalid header {name:?}: {reason}")]
    /// A caller header name or value is malformed.
    InvalidHeader {
        /// Header name as given.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    #[error("{0}")]
    /// Connecting, sending, or reading the response failed.
    Transport(String),
}

impl FetchError {
    /// Status code reported to the caller: 403 for refusals, 0 for transport failures.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Transport(_) => STATUS_TRANSPORT_FAILURE,
            _ => STATUS_BLOCKED,
        }
    }

    /// `true` when the request was refused by policy rather than failing in transit.
    pub fn is_refusal(&self) -> bool {
        self.status_code() == STATUS_BLOCKED
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// What the `fetch_url` tool reports back.
///
/// Failures are encoded here too (`status_code` 403 or 0, the message in
/// `body`, `length` 0) so the caller always receives the same shape.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Upstream status code, or 403/0 on failure.
    pub status_code: u16,
    /// Decoded response body, or the error message.
    pub body: String,
    /// Number of characters in `body` (0 on failure).
    pub length: usize,
    /// Redirects followed; absent on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_count: Option<u32>,
    /// URL of the response that was returned; absent on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

impl FetchOutcome {
    /// Outcome for a response that was received.
    pub fn response(status_code: u16, body: String, redirect_count: u32, final_url: String) -> Self {
        let length = body.chars().count();
        Self {
            status_code,
            body,
            length,
            redirect_count: Some(redirect_count),
            final_url: Some(final_url),
        }
    }

    /// Outcome for a refused or failed fetch.
    pub fn failure(error: &FetchError) -> Self {
        Self {
            status_code: error.status_code(),
            body: error.to_string(),
            length: 0,
            redirect_count: None,
            final_url: None,
        }
    }
}
