use crate::mcp::types::{
    ErrorObject, InitializeParams, InitializeResult, ServerCapabilities, ServerInfo, ToolsCapability,
};
use crate::mcp::{LATEST_PROTOCOL_VERSION, SERVER_NAME, SERVER_TITLE, SUPPORTED_PROTOCOL_VERSIONS};
use tracing::info;

const INSTRUCTIONS: &str = "Use fetch_url to retrieve http(s) resources. Requests to private, \
loopback, link-local and other internal addresses are refused unless the operator allowlisted them; \
refusals come back with status_code 403 and transport failures with status_code 0.";

/// Picks the protocol revision to speak: the client's if we support it, else our latest.
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// Handles the MCP initialize request.
pub async fn handle_initialize(params: InitializeParams) -> Result<InitializeResult, ErrorObject> {
    let protocol_version = negotiate_protocol_version(&params.protocol_version);
    info!(
        requested = %params.protocol_version,
        negotiated = protocol_version,
        client = ?params.client_info.as_ref().and_then(|c| c.name.as_deref()),
        "Client initializing"
    );

    Ok(InitializeResult {
        protocol_version: protocol_version.to_string(),
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            title: Some(SERVER_TITLE.to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        capabilities: ServerCapabilities {
            tools: ToolsCapability { list_changed: false },
        },
        instructions: Some(INSTRUCTIONS.to_string()),
    })
}
