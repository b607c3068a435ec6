//! Constants shared by the library, the CLI and the MCP server.

// Environment variables
/// Network interface the server binds to.
pub const ENV_MCP_HOST: &str = "MCP_HOST";
/// Network port the server binds to.
pub const ENV_MCP_PORT: &str = "MCP_PORT";
/// Comma-separated hostnames, IPs or CIDR ranges exempt from the internal-address block.
pub const ENV_ALLOWLIST: &str = "SECURE_FETCH_ALLOWLIST";
/// Maximum number of redirects followed per fetch.
pub const ENV_MAX_REDIRECTS: &str = "SECURE_FETCH_MAX_REDIRECTS";
/// Per-request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "SECURE_FETCH_TIMEOUT_SECS";

// Defaults
/// Default bind interface.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port.
pub const DEFAULT_PORT: u16 = 8000;
/// Default redirect budget.
pub const DEFAULT_MAX_REDIRECTS: u32 = 3;
/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Status code reported when a request is refused before it is sent.
pub const STATUS_BLOCKED: u16 = 403;
/// Status code reported when the request failed in transit.
pub const STATUS_TRANSPORT_FAILURE: u16 = 0;

/// Schemes a fetch is allowed to use.
pub const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];
