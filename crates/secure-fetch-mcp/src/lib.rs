// Expose modules needed by the binary and the integration tests
pub mod handlers;
pub mod http_transport;
pub mod mcp;
pub mod middleware;
pub mod server;
