//! The redirect-following fetch loop.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, HOST, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Method, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::Result;
use crate::fetch::outcome::{FetchError, FetchOutcome, FetchRequest};
use crate::fetch::pinning::PinnedResolver;
use crate::network::{Allowlist, EgressGuard, HostResolver, ResolvedTarget, SystemResolver};

/// Performs fetches on behalf of callers.
///
/// Redirects are never followed by the HTTP client itself. Each hop is checked
/// by the [`EgressGuard`] and the connection is pinned to the address that was
/// checked, while `Host` and TLS SNI keep using the hostname from the URL.
#[derive(Debug, Clone)]
pub struct Fetcher {
    guard: EgressGuard,
    client: reqwest::Client,
    pins: Arc<PinnedResolver>,
    max_redirects: u32,
}

impl Fetcher {
    /// Builds a fetcher that resolves hostnames through the operating system.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Builds a fetcher with a custom resolver.
    pub fn with_resolver(config: &FetchConfig, resolver: Arc<dyn HostResolver>) -> Result<Self> {
        let allowlist = Allowlist::parse(&config.allowlist)?;
        if !allowlist.is_empty() {
            info!(entries = allowlist.entries().len(), "Internal-address allowlist active");
        }

        // The client only ever connects to addresses the guard pinned
        let pins = Arc::new(PinnedResolver::default());
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .dns_resolver(pins.clone())
            .build()?;

        Ok(Self {
            guard: EgressGuard::new(allowlist, resolver),
            client,
            pins,
            max_redirects: config.max_redirects,
        })
    }

    /// The egress guard used for every hop.
    pub fn guard(&self) -> &EgressGuard {
        &self.guard
    }

    /// Runs only the egress check for `url`.
    pub async fn check(&self, url: &str) -> std::result::Result<ResolvedTarget, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url} ({e})")))?;
        self.guard.check(&url).await
    }

    /// Fetches `request`, encoding any failure in the returned outcome.
    #[instrument(skip(self, request), fields(url = %request.url, method = %request.method))]
    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        match self.try_fetch(&request).await {
            Ok(outcome) => {
                info!(
                    status = outcome.status_code,
                    redirects = ?outcome.redirect_count,
                    length = outcome.length,
                    "Fetch completed"
                );
                outcome
            }
            Err(e) => {
                if e.is_refusal() {
                    warn!(error = %e, "Fetch refused");
                } else {
                    warn!(error = %e, "Fetch failed");
                }
                FetchOutcome::failure(&e)
            }
        }
    }

    async fn try_fetch(&self, request: &FetchRequest) -> std::result::Result<FetchOutcome, FetchError> {
        let method = parse_method(&request.method)?;
        let headers = build_headers(request.headers.as_ref())?;
        let mut current = Url::parse(&request.url)
            .map_err(|e| FetchError::InvalidUrl(format!("{} ({e})", request.url)))?;
        let mut redirect_count: u32 = 0;

        loop {
            let target = self.guard.check(&current).await?;
            let response = self
                .send(&target, &current, method.clone(), headers.clone())
                .await?;

            if !response.status().is_redirection() {
                return finish(response, redirect_count, &current).await;
            }

            redirect_count += 1;
            if redirect_count > self.max_redirects {
                debug!(redirect_count, "Redirect budget exhausted");
                return finish(response, redirect_count, &current).await;
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let Some(location) = location else {
                debug!("Redirect without Location header");
                return finish(response, redirect_count, &current).await;
            };

            let next = current
                .join(&location)
                .map_err(|e| FetchError::InvalidUrl(format!("{location} ({e})")))?;
            debug!(from = %current, to = %next, redirect_count, "Following redirect");
            current = next;
        }
    }

    async fn send(
        &self,
        target: &ResolvedTarget,
        url: &Url,
        method: Method,
        headers: HeaderMap,
    ) -> std::result::Result<Response, FetchError> {
        // IP-literal URLs already name the checked address
        if url.domain().is_some() {
            self.pins.pin(&target.host, target.addr);
        }

        debug!(%url, addr = %target.addr, "Sending request");
        Ok(self
            .client
            .request(method, url.clone())
            .headers(headers)
            .send()
            .await?)
    }
}

async fn finish(
    response: Response,
    redirect_count: u32,
    final_url: &Url,
) -> std::result::Result<FetchOutcome, FetchError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(FetchOutcome::response(status, body, redirect_count, final_url.to_string()))
}

fn parse_method(raw: &str) -> std::result::Result<Method, FetchError> {
    let normalized = raw.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(FetchError::InvalidMethod(raw.to_string()));
    }
    Method::from_bytes(normalized.as_bytes()).map_err(|_| FetchError::InvalidMethod(raw.to_string()))
}

fn build_headers(
    headers: Option<&HashMap<String, String>>,
) -> std::result::Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    let Some(headers) = headers else {
        return Ok(map);
    };

    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        // Host always follows the URL being fetched
        if header_name == HOST {
            debug!(value = %value, "Ignoring caller-supplied Host header");
            continue;
        }
        let header_value = HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
