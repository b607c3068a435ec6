use crate::handlers::fetch_url::handle_fetch_url;
use crate::mcp::{
    error_codes,
    types::{CallToolParams, CallToolResult, ErrorObject, FetchUrlParams, ToolAnnotations, ToolDefinition},
};
use crate::server::{deserialize_value, ok_some, result_to_call_result};

use secure_fetch::Fetcher;
use serde_json::json;
use tracing::instrument;

pub const FETCH_URL_TOOL: &str = "fetch_url";

#[instrument(skip(params, fetcher), fields(tool_name = %params.name))]
pub async fn handle_tools_call(
    params: CallToolParams,
    fetcher: &Fetcher,
) -> Result<Option<serde_json::Value>, ErrorObject> {
    let tool_name = params.name.as_str();
    let arguments = params.arguments.unwrap_or_else(|| json!({}));

    let result: Result<CallToolResult, ErrorObject> = match tool_name {
        FETCH_URL_TOOL => {
            let fetch_params: FetchUrlParams = deserialize_value(arguments, tool_name)?;
            match handle_fetch_url(fetch_params, fetcher).await {
                Ok(res) => result_to_call_result(res),
                Err(e) => Err(e),
            }
        }
        _ => Err(ErrorObject::new(
            error_codes::INVALID_PARAMS,
            format!("Unknown tool: {}", tool_name),
        )),
    };

    ok_some(result?)
}

pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: FETCH_URL_TOOL.to_string(),
        description: Some(
            "Fetch a URL and return response details (status_code, body, length, redirect_count, final_url). \
             Only http and https are permitted. The host is resolved before connecting and requests to \
             private or internal addresses are refused with status_code 403 unless allowlisted by the \
             operator. Up to 3 redirects are followed, each one re-checked. Network failures are reported \
             with status_code 0."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method to use",
                    "default": "GET"
                },
                "headers": {
                    "type": ["object", "null"],
                    "description": "Optional HTTP headers",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["url"]
        }),
        output_schema: Some(json!({
            "type": "object",
            "properties": {
                "status_code": { "type": "integer" },
                "body": { "type": "string" },
                "length": { "type": "integer" },
                "redirect_count": { "type": "integer" },
                "final_url": { "type": "string" }
            },
            "required": ["status_code", "body", "length"]
        })),
        annotations: Some(ToolAnnotations {
            title: Some("Fetch URL".to_string()),
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
            open_world_hint: Some(true),
        }),
    }]
}
