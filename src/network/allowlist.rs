//! Operator allowlist of hostnames, IP addresses and CIDR ranges.

use std::net::IpAddr;

use crate::error::{Result, SecureFetchError};

/// A single allowlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowEntry {
    /// Exact hostname, stored lowercase without a trailing dot.
    Host(String),
    /// Exact IP address.
    Ip(IpAddr),
    /// Network given as `address/prefix`.
    Cidr {
        /// Network address.
        network: IpAddr,
        /// Prefix length in bits.
        prefix: u8,
    },
}

impl AllowEntry {
    fn parse(raw: &str) -> Result<Self> {
        if let Some((addr, prefix)) = raw.split_once('/') {
            let invalid = || SecureFetchError::InvalidAllowlistEntry(raw.to_string());
            let network: IpAddr = addr.parse().map_err(|_| invalid())?;
            let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
            let max = if network.is_ipv4() { 32 } else { 128 };
            if prefix > max {
                return Err(invalid());
            }
            return Ok(AllowEntry::Cidr { network, prefix });
        }

        // IPv6 literals may come bracketed the way they appear in URLs
        let unbracketed = raw.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Ok(AllowEntry::Ip(ip));
        }
        Ok(AllowEntry::Host(normalize_host(raw)))
    }

    fn matches(&self, host: &str, ip: &IpAddr) -> bool {
        match self {
            AllowEntry::Host(name) => *name == normalize_host(host),
            AllowEntry::Ip(allowed) => allowed == ip,
            AllowEntry::Cidr { network, prefix } => cidr_contains(network, *prefix, ip),
        }
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn cidr_contains(network: &IpAddr, prefix: u8, ip: &IpAddr) -> bool {
    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(addr)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            (u32::from(*net) & mask) == (u32::from(*addr) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(addr)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            (u128::from(*net) & mask) == (u128::from(*addr) & mask)
        }
        _ => false,
    }
}

/// Operator-provided exceptions to the internal-address block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    entries: Vec<AllowEntry>,
}

impl Allowlist {
    /// Parses entries, ignoring surrounding whitespace and empty entries.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .filter_map(|entry| {
                let trimmed = entry.as_ref().trim();
                (!trimmed.is_empty()).then(|| AllowEntry::parse(trimmed))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Parses a comma-separated list, as found in `SECURE_FETCH_ALLOWLIST`.
    pub fn from_env_value(value: &str) -> Result<Self> {
        Self::parse(value.split(','))
    }

    /// Whether a connection to `ip`, reached through `host`, is explicitly allowed.
    pub fn permits(&self, host: &str, ip: &IpAddr) -> bool {
        self.entries.iter().any(|entry| entry.matches(host, ip))
    }

    /// The parsed entries.
    pub fn entries(&self) -> &[AllowEntry] {
        &self.entries
    }

    /// `true` when nothing is allowlisted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
