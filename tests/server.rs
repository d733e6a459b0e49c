mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{MockUpstream, VIDEO_ID};
use douyin_mcp::config::TranscriptionProvider;
use douyin_mcp::server::{build_router, AppState};
use douyin_mcp::Pipeline;

fn router(upstream: &MockUpstream) -> Router {
    let pipeline = Pipeline::new(&upstream.config(TranscriptionProvider::OpenaiCompatible)).unwrap();
    build_router(AppState {
        pipeline: Arc::new(pipeline),
    })
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn rpc(router: Router, body: Value) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, read_json(response).await)
}

#[tokio::test]
async fn test_health() {
    let upstream = MockUpstream::start().await;

    let response = router(&upstream)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "douyin-mcp-server");
    assert_eq!(json["mcp_endpoint"], "/mcp");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_root_lists_tools() {
    let upstream = MockUpstream::start().await;

    let response = router(&upstream)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = read_json(response).await;
    assert_eq!(json["message"], "抖音 MCP 服务器运行中");
    assert_eq!(json["endpoints"]["mcp"], "/mcp");
    assert_eq!(json["tools"], json!(["get_download_link", "extract_text"]));
}

#[tokio::test]
async fn test_cors_preflight_exposes_session_header() {
    let upstream = MockUpstream::start().await;

    let response = router(&upstream)
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/mcp")
                .header(header::ORIGIN, "https://inspector.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );

    let response = router(&upstream)
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "https://inspector.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("mcp-session-id"));
}

#[tokio::test]
async fn test_initialize() {
    let upstream = MockUpstream::start().await;

    let (status, json) = rpc(
        router(&upstream),
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0" }
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 1);
    assert_eq!(json["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(json["result"]["serverInfo"]["name"], "douyin-mcp-server");
    assert!(json["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_notification_is_accepted() {
    let upstream = MockUpstream::start().await;

    let response = router(&upstream)
        .oneshot(
            Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_tools_list() {
    let upstream = MockUpstream::start().await;

    let (_, json) = rpc(
        router(&upstream),
        json!({ "jsonrpc": "2.0", "id": "a", "method": "tools/list" }),
    )
    .await;

    let tools = json["result"]["tools"].as_array().unwrap();
    let names: Vec<_> = tools.iter().map(|tool| tool["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["get_download_link", "extract_text"]);
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["share_link"]));
}

#[tokio::test]
async fn test_call_get_download_link() {
    let upstream = MockUpstream::start().await;

    let (_, json) = rpc(
        router(&upstream),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "get_download_link", "arguments": { "share_link": upstream.share_text() } }
        }),
    )
    .await;

    let result = &json["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["structuredContent"]["videoId"], VIDEO_ID);

    let text = result["content"][0]["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed, result["structuredContent"]);
}

#[tokio::test]
async fn test_call_legacy_name_without_link() {
    let upstream = MockUpstream::start().await;

    let (_, json) = rpc(
        router(&upstream),
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "get_douyin_download_link", "arguments": { "share_link": "nothing here" } }
        }),
    )
    .await;

    let result = &json["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(
        result["structuredContent"]["message"],
        "获取下载链接失败"
    );
    assert!(result["structuredContent"]["error"].is_string());
}

#[tokio::test]
async fn test_call_extract_text() {
    let upstream = MockUpstream::start().await;

    let (_, json) = rpc(
        router(&upstream),
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": "extract_text", "arguments": { "share_link": upstream.share_url() } }
        }),
    )
    .await;

    assert_eq!(
        json["result"],
        json!({ "content": [{ "type": "text", "text": "hello world" }], "isError": false })
    );
}

#[tokio::test]
async fn test_protocol_errors() {
    let upstream = MockUpstream::start().await;

    let response = router(&upstream)
        .oneshot(
            Request::post("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"]["code"], -32700);

    let (_, json) = rpc(
        router(&upstream),
        json!({ "jsonrpc": "2.0", "id": 5, "method": "resources/list" }),
    )
    .await;
    assert_eq!(json["error"]["code"], -32601);

    let (_, json) = rpc(
        router(&upstream),
        json!({ "jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": { "name": "nope" } }),
    )
    .await;
    assert_eq!(json["error"]["code"], -32602);

    let (_, json) = rpc(
        router(&upstream),
        json!({ "jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": { "name": "extract_text", "arguments": {} } }),
    )
    .await;
    assert_eq!(json["error"]["code"], -32602);
    assert_eq!(upstream.hits.total(), 0);
}
