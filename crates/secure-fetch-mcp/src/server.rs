use crate::handlers::initialize::handle_initialize;
use crate::handlers::ping::handle_ping;
use crate::handlers::tool::{get_tool_definitions, handle_tools_call};
use crate::mcp::error_codes;
use crate::mcp::types::{
    CallToolParams, CallToolResult, ContentBlock, ErrorObject, InitializeParams,
    InitializedNotificationParams, ListToolsParams, ListToolsResult, PingParams, Request, Response,
    JSONRPC_VERSION,
};
use anyhow::{Context, Result};
use secure_fetch::{AppConfig, Fetcher};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct Server {
    fetcher: Arc<Fetcher>,
}

impl Server {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let fetcher = Fetcher::new(&config.fetch).context("Failed to build fetcher")?;
        Ok(Self::from_fetcher(fetcher))
    }

    /// Creates a Server around an existing fetcher, primarily for testing purposes.
    pub fn from_fetcher(fetcher: Fetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    /// Serves newline-delimited JSON-RPC on stdin/stdout until stdin closes.
    pub async fn run_stdio(&self) -> Result<()> {
        info!("MCP server reading from stdin and writing to stdout.");
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();

        let mut reader = BufReader::new(stdin);
        let mut writer = BufWriter::new(stdout);

        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            let read = reader
                .read_line(&mut line_buf)
                .await
                .context("Error reading from stdin")?;
            if read == 0 {
                info!("Stdin closed, shutting down.");
                break;
            }

            let trimmed_line = line_buf.trim();
            if trimmed_line.is_empty() {
                continue;
            }
            debug!(request = %trimmed_line, "Received message");

            if let Some(response_json) = self.process_json_rpc_request_str(trimmed_line).await {
                debug!(response = %response_json, "Sending response");
                writer
                    .write_all(response_json.as_bytes())
                    .await
                    .context("Failed to write response to stdout")?;
                writer
                    .write_all(b"\n")
                    .await
                    .context("Failed to write newline to stdout")?;
                writer.flush().await.context("Failed to flush stdout")?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self, request), fields(request_id = ?request.id, method = %request.method))]
    pub async fn handle_request(&self, request: Request) -> Result<Option<Value>, ErrorObject> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(ErrorObject::new(
                error_codes::INVALID_REQUEST,
                "Invalid jsonrpc version",
            ));
        }

        match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = deserialize_params(request.params, "initialize")?;
                let result = handle_initialize(params).await?;
                ok_some(result)
            }
            "initialized" | "notifications/initialized" => {
                let _params: InitializedNotificationParams =
                    deserialize_params(request.params, "initialized")?;
                info!("Received initialized notification");
                Ok(None)
            }
            method if method.starts_with("notifications/") => {
                debug!(method, "Ignoring notification");
                Ok(None)
            }
            "ping" => {
                let params: PingParams = deserialize_params(request.params, "ping")?;
                let result = handle_ping(params).await?;
                ok_some(result)
            }
            "tools/list" => {
                let _params: ListToolsParams = deserialize_params(request.params, "tools/list")?;
                let result = ListToolsResult {
                    tools: get_tool_definitions(),
                };
                ok_some(result)
            }
            "tools/call" => {
                let params: CallToolParams = deserialize_params(request.params, "tools/call")?;
                handle_tools_call(params, &self.fetcher).await
            }
            _ => Err(ErrorObject::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    /// Handles one decoded JSON-RPC message, single or batch.
    ///
    /// Returns `None` when nothing has to be sent back (notifications only).
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        match message {
            Value::Array(items) => {
                if items.is_empty() {
                    let response = Response::error(
                        ErrorObject::new(error_codes::INVALID_REQUEST, "Empty batch"),
                        None,
                    );
                    return Some(to_json(&response));
                }
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.handle_single(item).await {
                        responses.push(to_json(&response));
                    }
                }
                (!responses.is_empty()).then_some(Value::Array(responses))
            }
            single => self
                .handle_single(single)
                .await
                .map(|response| to_json(&response)),
        }
    }

    async fn handle_single(&self, message: Value) -> Option<Response> {
        let raw_id = message.get("id").cloned().filter(|id| !id.is_null());
        let request: Request = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed JSON-RPC request");
                return Some(Response::error(
                    ErrorObject::new(error_codes::INVALID_REQUEST, format!("Invalid request: {}", e)),
                    raw_id,
                ));
            }
        };

        let is_notification = request.is_notification();
        let request_id = request.id.clone();
        let result = self.handle_request(request).await;

        if is_notification {
            if let Err(e) = result {
                warn!(code = e.code, message = %e.message, "Notification failed");
            }
            return None;
        }

        Some(match result {
            Ok(Some(value)) => Response::success(value, request_id),
            Ok(None) => Response::success(json!({}), request_id),
            Err(error_object) => Response::error(error_object, request_id),
        })
    }

    /// Processes a raw JSON-RPC string and returns the raw response, if any.
    pub async fn process_json_rpc_request_str(&self, json_request_str: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(json_request_str) {
            Ok(message) => self.handle_message(message).await?,
            Err(e) => {
                warn!(error = %e, "Failed to parse request JSON");
                to_json(&parse_error_response(&e))
            }
        };
        Some(response.to_string())
    }
}

pub fn parse_error_response(e: &serde_json::Error) -> Response {
    Response::error(
        ErrorObject::new(error_codes::PARSE_ERROR, format!("Failed to parse request: {}", e)),
        None,
    )
}

fn to_json(response: &Response) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize response");
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "error": { "code": error_codes::INTERNAL_ERROR, "message": "Failed to serialize response" },
            "id": Value::Null,
        })
    })
}

pub fn deserialize_params<T: serde::de::DeserializeOwned + Default>(
    params: Option<Value>,
    method_name: &str,
) -> Result<T, ErrorObject> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(p) => deserialize_value(p, method_name),
    }
}

pub fn deserialize_value<T: serde::de::DeserializeOwned>(
    value: Value,
    method_name: &str,
) -> Result<T, ErrorObject> {
    serde_json::from_value(value).map_err(|e| {
        ErrorObject::new(
            error_codes::INVALID_PARAMS,
            format!("Invalid params/arguments for {}: {}", method_name, e),
        )
    })
}

pub fn ok_some<T: serde::Serialize>(value: T) -> Result<Option<Value>, ErrorObject> {
    serde_json::to_value(value)
        .map_err(|e| {
            ErrorObject::new(
                error_codes::INTERNAL_ERROR,
                format!("Failed to serialize result: {}", e),
            )
        })
        .map(Some)
}

/// Wraps a tool's output as both a JSON text block and structured content.
pub fn result_to_call_result<T: serde::Serialize>(result: T) -> Result<CallToolResult, ErrorObject> {
    let structured = serde_json::to_value(&result).map_err(|e| {
        ErrorObject::new(
            error_codes::INTERNAL_ERROR,
            format!("Failed to serialize tool result: {}", e),
        )
    })?;
    let text = serde_json::to_string_pretty(&structured).map_err(|e| {
        ErrorObject::new(
            error_codes::INTERNAL_ERROR,
            format!("Failed to serialize tool result: {}", e),
        )
    })?;
    Ok(CallToolResult {
        content: vec![ContentBlock::text(text)],
        structured_content: Some(structured),
        is_error: Some(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secure_fetch::FetchConfig;

    fn server() -> Server {
        Server::new(&AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_round_trip() {
        let response = server()
            .process_json_rpc_request_str(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#,
            )
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(value["result"]["serverInfo"]["name"], "secure-fetch");
        assert_eq!(value["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let response = server()
            .process_json_rpc_request_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());

        let cancelled = server()
            .process_json_rpc_request_str(
                r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":3}}"#,
            )
            .await;
        assert!(cancelled.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let value = server()
            .handle_message(json!({"jsonrpc": "2.0", "id": "x", "method": "resources/list"}))
            .await
            .unwrap();
        assert_eq!(value["id"], "x");
        assert_eq!(value["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let value = server()
            .handle_message(json!({"jsonrpc": "1.0", "id": 7, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(value["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(value["id"], 7);
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let response = server().process_json_rpc_request_str("{not json").await.unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(value["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_structurally_invalid_request() {
        let value = server()
            .handle_message(json!({"jsonrpc": "2.0", "id": 4}))
            .await
            .unwrap();
        assert_eq!(value["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(value["id"], 4);
    }

    #[tokio::test]
    async fn test_ping_returns_empty_object() {
        let value = server()
            .handle_message(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(value["result"], json!({}));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let value = server()
            .handle_message(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list", "params": {}}))
            .await
            .unwrap();
        assert_eq!(value["result"]["tools"][0]["name"], "fetch_url");
        assert_eq!(value["result"]["tools"][0]["inputSchema"]["required"], json!(["url"]));
    }

    #[tokio::test]
    async fn test_tools_call_refuses_internal_address() {
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let value = Server::from_fetcher(fetcher)
            .handle_message(json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"name": "fetch_url", "arguments": {"url": "http://10.0.0.1/"}}
            }))
            .await
            .unwrap();
        assert_eq!(value["result"]["isError"], false);
        assert_eq!(value["result"]["structuredContent"]["status_code"], 403);
        assert_eq!(
            value["result"]["structuredContent"]["body"],
            "IP 10.0.0.1 is private/internal and not allowed"
        );
    }

    #[tokio::test]
    async fn test_batch_skips_notifications() {
        let value = server()
            .handle_message(json!([
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                {"jsonrpc": "2.0", "id": 2, "method": "nope"}
            ]))
            .await
            .unwrap();
        let responses = value.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notification_only_batch_and_empty_batch() {
        let none = server()
            .handle_message(json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]))
            .await;
        assert!(none.is_none());

        let empty = server().handle_message(json!([])).await.unwrap();
        assert_eq!(empty["error"]["code"], error_codes::INVALID_REQUEST);
    }
}
