//! Hostname resolution seam.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use tracing::trace;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
/// Trait defining hostname resolution.
/// This allows for mocking DNS in tests.
pub trait HostResolver: Send + Sync {
    /// Resolves `host` to the addresses a connection on `port` would use.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, port))
            .await?
            .map(|addr| addr.ip())
            .collect();
        trace!(host, ?addrs, "Resolved host");
        Ok(addrs)
    }
}
