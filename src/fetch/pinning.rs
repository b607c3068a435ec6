//! DNS resolver for the shared HTTP client that only hands out checked addresses.

use reqwest::dns::{Name, Resolve, Resolving};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::RwLock;
use tracing::warn;

/// Maps hostnames to the address the egress guard pinned for them.
///
/// A hostname that was never pinned does not resolve at all, so the client
/// can never fall back to the system resolver.
#[derive(Debug, Default)]
pub struct PinnedResolver {
    pins: RwLock<HashMap<String, SocketAddr>>,
}

impl PinnedResolver {
    /// Records `addr` as the only address `host` may connect to.
    pub fn pin(&self, host: &str, addr: SocketAddr) {
        match self.pins.write() {
            Ok(mut pins) => {
                pins.insert(host.to_ascii_lowercase(), addr);
            }
            Err(poisoned) => {
                warn!(%host, "Pin table lock poisoned, recovering");
                poisoned.into_inner().insert(host.to_ascii_lowercase(), addr);
            }
        }
    }

    /// The address currently pinned for `host`.
    pub fn lookup(&self, host: &str) -> Option<SocketAddr> {
        let key = host.to_ascii_lowercase();
        match self.pins.read() {
            Ok(pins) => pins.get(&key).copied(),
            Err(poisoned) => poisoned.into_inner().get(&key).copied(),
        }
    }
}

impl Resolve for PinnedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        let pinned = self.lookup(&host);
        Box::pin(async move {
            match pinned {
                Some(addr) => {
                    let addrs: Box<dyn Iterator<Item = SocketAddr> + Send> =
                        Box::new(std::iter::once(addr));
                    Ok(addrs)
                }
                None => {
                    let err: Box<dyn std::error::Error + Send + Sync> = Box::new(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{host} was not checked before connecting"),
                    ));
                    Err(err)
                }
            }
        })
    }
}
