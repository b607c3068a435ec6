use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use secure_fetch::AppConfig;
use secure_fetch_mcp::http_transport::{build_router, AppState};
use secure_fetch_mcp::server::Server;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{header as header_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn router_with_allowlist(allow: &[&str]) -> Router {
    let mut config = AppConfig::default();
    config.fetch.allowlist = allow.iter().map(|s| s.to_string()).collect();
    config.fetch.request_timeout_secs = 5;
    let server = Server::new(&config).expect("server should build");
    build_router(AppState {
        server: Arc::new(server),
    })
}

async fn rpc(app: &Router, message: Value) -> (StatusCode, Option<Value>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json, text/event-stream")
        .body(Body::from(message.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, body)
}

fn fetch_call(id: u64, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": "fetch_url", "arguments": arguments}
    })
}

#[tokio::test]
async fn handshake_then_list_tools() {
    let app = router_with_allowlist(&[]);

    let (status, body) = rpc(
        &app,
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "1.0"}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert!(body["result"]["capabilities"]["tools"].is_object());

    let (status, body) = rpc(
        &app,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_none());

    let (_, body) = rpc(&app, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    let tools = body.unwrap()["result"]["tools"].clone();
    assert_eq!(tools.as_array().unwrap().len(), 1);
    assert_eq!(tools[0]["name"], "fetch_url");
}

#[tokio::test]
async fn fetch_url_reaches_allowlisted_target() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/items/7"))
        .and(header_matcher("x-api-version", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stored"))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = router_with_allowlist(&["127.0.0.1"]);
    let url = format!("{}/items/7", upstream.uri());
    let (status, body) = rpc(
        &app,
        fetch_call(
            2,
            json!({"url": url, "method": "PUT", "headers": {"X-Api-Version": "2"}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result = &body.unwrap()["result"];
    assert_eq!(result["isError"], false);
    let outcome = &result["structuredContent"];
    assert_eq!(outcome["status_code"], 200);
    assert_eq!(outcome["body"], "stored");
    assert_eq!(outcome["length"], 6);
    assert_eq!(outcome["redirect_count"], 0);
    assert_eq!(outcome["final_url"], url);
    let text: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(&text, outcome);
}

#[tokio::test]
async fn fetch_url_refuses_loopback_by_default() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let app = router_with_allowlist(&[]);
    let (_, body) = rpc(&app, fetch_call(3, json!({"url": upstream.uri()}))).await;

    let outcome = body.unwrap()["result"]["structuredContent"].clone();
    assert_eq!(
        outcome,
        json!({
            "status_code": 403,
            "body": "IP 127.0.0.1 is private/internal and not allowed",
            "length": 0
        })
    );
}

#[tokio::test]
async fn fetch_url_follows_redirect_chain() {
    let upstream = MockServer::start().await;
    Mock::given(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/b"))
        .mount(&upstream)
        .await;
    Mock::given(path("/b"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("Location", format!("{}/c", upstream.uri()).as_str()),
        )
        .mount(&upstream)
        .await;
    Mock::given(path("/c"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&upstream)
        .await;

    let app = router_with_allowlist(&["127.0.0.0/8"]);
    let (_, body) = rpc(&app, fetch_call(4, json!({"url": format!("{}/a", upstream.uri())}))).await;

    let outcome = body.unwrap()["result"]["structuredContent"].clone();
    assert_eq!(outcome["status_code"], 404);
    assert_eq!(outcome["body"], "gone");
    assert_eq!(outcome["redirect_count"], 2);
    assert_eq!(outcome["final_url"], format!("{}/c", upstream.uri()));
}

#[tokio::test]
async fn batch_mixes_results_and_errors() {
    let app = router_with_allowlist(&[]);
    let (status, body) = rpc(
        &app,
        json!([
            {"jsonrpc": "2.0", "id": 10, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            fetch_call(11, json!({"url": "gopher://example.com/"})),
            {"jsonrpc": "2.0", "id": 12, "method": "tools/call", "params": {"name": "nope"}}
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let responses = body.unwrap();
    let responses = responses.as_array().unwrap();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["result"], json!({}));
    assert_eq!(responses[1]["result"]["structuredContent"]["status_code"], 403);
    assert_eq!(
        responses[1]["result"]["structuredContent"]["body"],
        "Scheme 'gopher' is not allowed. Only http and https are permitted."
    );
    assert_eq!(responses[2]["error"]["code"], -32602);
}
