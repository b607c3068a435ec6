pub mod error_codes;
pub mod types;

/// Protocol revisions this server can speak, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", "2025-06-18"];

/// Revision offered when the client asks for one we do not know.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

pub const SERVER_NAME: &str = "secure-fetch";
pub const SERVER_TITLE: &str = "Secure Fetch";
