//! Route handlers

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use super::protocol::{self, error_codes, JsonRpcRequest, JsonRpcResponse};
use super::tools;
use super::{AppState, MCP_PATH};

pub const SERVICE_NAME: &str = "douyin-mcp-server";

/// Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "mcp_endpoint": MCP_PATH,
    }))
}

/// Service info
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "抖音 MCP 服务器运行中",
        "endpoints": {
            "health": "/health",
            "mcp": MCP_PATH,
        },
        "tools": tools::tool_names(),
    }))
}

/// Stateless JSON-RPC endpoint.
///
/// Requests get a JSON response; notifications are acknowledged with `202 Accepted`.
pub async fn mcp(State(state): State<AppState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed JSON-RPC request");
            let response = JsonRpcResponse::failure(
                Value::Null,
                protocol::JsonRpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e)),
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "Notification received");
        return StatusCode::ACCEPTED.into_response();
    };

    tracing::debug!(method = %request.method, "JSON-RPC request");

    let response = match protocol::dispatch(&state.pipeline, &request.method, request.params).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    };

    Json(response).into_response()
}
