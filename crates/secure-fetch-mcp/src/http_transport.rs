use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

use crate::mcp::error_codes;
use crate::mcp::types::{ErrorObject, Response as McpResponse};
use crate::middleware::secure_headers_middleware;
use crate::server::{parse_error_response, Server};

// Shared state for the Axum application
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(mcp_json_rpc_handler)
                .get(method_not_allowed_handler)
                .delete(method_not_allowed_handler),
        )
        .route("/mcp/", post(mcp_json_rpc_handler))
        .route("/health", get(health_check_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(
                    secure_headers_middleware::secure_headers_middleware,
                )),
        )
        .with_state(app_state)
}

pub async fn run_http_server(addr_str: String, server: Server) -> anyhow::Result<()> {
    let app = build_router(AppState {
        server: Arc::new(server),
    });

    let bind_addr: SocketAddr = addr_str
        .parse()
        .with_context(|| format!("Invalid bind address: {}", addr_str))?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!(address = %bind_addr, "MCP HTTP server listening (POST /mcp, GET /health)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// A missing `Accept` header is treated as accepting anything.
fn accepts_json(headers: &HeaderMap) -> bool {
    let mut values = headers.get_all(header::ACCEPT).iter().peekable();
    if values.peek().is_none() {
        return true;
    }
    values
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|media| media.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .any(|media| media == "application/json" || media == "application/*" || media == "*/*")
}

fn error_response(status: StatusCode, code: i64, message: &str) -> AxumResponse {
    let body = McpResponse::error(ErrorObject::new(code, message), None);
    (status, Json(body)).into_response()
}

#[instrument(skip(app_state, headers, body_bytes), fields(body_len = body_bytes.len()))]
async fn mcp_json_rpc_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body_bytes: Bytes,
) -> AxumResponse {
    if !accepts_json(&headers) {
        warn!(accept = ?headers.get(header::ACCEPT), "Client does not accept application/json");
        return error_response(
            StatusCode::NOT_ACCEPTABLE,
            error_codes::INVALID_REQUEST,
            "Not Acceptable: client must accept application/json",
        );
    }

    let message: serde_json::Value = match serde_json::from_slice(&body_bytes) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Failed to parse request body");
            return (StatusCode::BAD_REQUEST, Json(parse_error_response(&e))).into_response();
        }
    };

    match app_state.server.handle_message(message).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => {
            debug!("Only notifications received, acknowledging");
            StatusCode::ACCEPTED.into_response()
        }
    }
}

async fn method_not_allowed_handler() -> AxumResponse {
    let body = json!({
        "jsonrpc": "2.0",
        "error": {
            "code": error_codes::INVALID_REQUEST,
            "message": "Method not allowed: this server is stateless and only accepts POST"
        },
        "id": null
    });
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(body),
    )
        .into_response()
}

async fn health_check_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use secure_fetch::AppConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let server = Server::new(&AppConfig::default()).unwrap();
        build_router(AppState {
            server: Arc::new(server),
        })
    }

    fn post_mcp(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: AxumResponse) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_accepts_json() {
        let mut headers = HeaderMap::new();
        assert!(accepts_json(&headers));
        headers.insert(header::ACCEPT, "text/html".parse().unwrap());
        assert!(!accepts_json(&headers));
        headers.insert(header::ACCEPT, "text/html, */*;q=0.8".parse().unwrap());
        assert!(accepts_json(&headers));
        headers.insert(header::ACCEPT, "Application/JSON; charset=utf-8".parse().unwrap());
        assert!(accepts_json(&headers));
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_ping_over_http() {
        let response = app()
            .oneshot(post_mcp("/mcp", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = json_body(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"], json!({}));
    }

    #[tokio::test]
    async fn test_trailing_slash_route() {
        let response = app()
            .oneshot(post_mcp("/mcp/", r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["result"]["tools"][0]["name"], "fetch_url");
    }

    #[tokio::test]
    async fn test_notification_is_accepted_without_body() {
        let response = app()
            .oneshot(post_mcp(
                "/mcp",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let response = app().oneshot(post_mcp("/mcp", "{oops")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_not_acceptable() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(header::ACCEPT, "text/html")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_get_and_delete_are_not_allowed() {
        for method in [Method::GET, Method::DELETE] {
            let response = app()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/mcp")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.headers()[header::ALLOW], "POST");
        }
    }
}
