//! Egress policy: which addresses a fetch may reach.
//!
//! - `address`: classification of internal/non-public addresses.
//! - `allowlist`: operator exceptions (hostnames, IPs, CIDR ranges).
//! - `resolver`: the DNS seam.
//! - `guard`: the per-hop check that ties them together.

pub mod address;
pub mod allowlist;
pub mod guard;
pub mod resolver;

pub use address::is_internal;
pub use allowlist::{AllowEntry, Allowlist};
pub use guard::{EgressGuard, ResolvedTarget};
pub use resolver::{HostResolver, SystemResolver};
