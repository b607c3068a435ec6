//! Per-hop egress check and address pinning.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::constants::ALLOWED_SCHEMES;
use crate::fetch::FetchError;
use crate::network::address::is_internal;
use crate::network::allowlist::Allowlist;
use crate::network::resolver::HostResolver;

/// A URL that passed the egress check, together with the address to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Hostname as written in the URL; used for `Host` and TLS SNI.
    pub host: String,
    /// Lowercased scheme, `http` or `https`.
    pub scheme: String,
    /// Pinned address. Only this address may be dialled for this hop.
    pub addr: SocketAddr,
}

/// Decides whether a URL may be fetched and where the connection must go.
#[derive(Clone)]
pub struct EgressGuard {
    allowlist: Allowlist,
    resolver: Arc<dyn HostResolver>,
}

impl std::fmt::Debug for EgressGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressGuard")
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}

impl EgressGuard {
    /// Creates a guard using `resolver` for DNS lookups.
    pub fn new(allowlist: Allowlist, resolver: Arc<dyn HostResolver>) -> Self {
        Self { allowlist, resolver }
    }

    /// The allowlist this guard enforces.
    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Checks `url` and pins it to a permitted address.
    ///
    /// Every resolved address must be permitted; a single internal answer in an
    /// otherwise public record set rejects the whole host.
    pub async fn check(&self, url: &Url) -> Result<ResolvedTarget, FetchError> {
        let scheme = url.scheme().to_ascii_lowercase();
        if !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
            return Err(FetchError::UnsupportedScheme(scheme));
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        let (host, addrs) = match url.host() {
            None => return Err(FetchError::MissingHost(url.to_string())),
            Some(Host::Ipv4(v4)) => (v4.to_string(), vec![IpAddr::V4(v4)]),
            Some(Host::Ipv6(v6)) => (v6.to_string(), vec![IpAddr::V6(v6)]),
            Some(Host::Domain(domain)) => {
                let addrs = self
                    .resolver
                    .resolve(domain, port)
                    .await
                    .map_err(|e| {
                        debug!(host = domain, error = %e, "Resolution failed");
                        FetchError::Unresolvable(domain.to_string())
                    })?;
                (domain.to_string(), addrs)
            }
        };

        if addrs.is_empty() {
            return Err(FetchError::Unresolvable(host));
        }

        if let Some(blocked) = addrs
            .iter()
            .find(|ip| !self.allowlist.permits(&host, ip) && is_internal(ip))
        {
            warn!(%host, ip = %blocked, "Refusing fetch to internal address");
            return Err(FetchError::InternalAddress {
                ip: *blocked,
                host,
            });
        }

        let ip = addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| FetchError::Unresolvable(host.clone()))?;

        debug!(%host, %ip, port, "Egress check passed");
        Ok(ResolvedTarget {
            host,
            scheme,
            addr: SocketAddr::new(ip, port),
        })
    }
}
