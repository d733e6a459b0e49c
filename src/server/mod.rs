//! HTTP Server
//!
//! Axum server exposing the tool endpoint plus liveness and info routes

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod handlers;
pub mod protocol;
pub mod tools;

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;

/// Path the tool-calling endpoint is mounted on
pub const MCP_PATH: &str = "/mcp";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Build the router with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    // Browser-based clients need the session header even though sessions are not used
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static("mcp-session-id")])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(MCP_PATH, post(handlers::mcp))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP server
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ServerConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            state: AppState { pipeline },
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Start the server, stopping once `shutdown_signal` resolves
    pub async fn run_with_shutdown<F>(self, shutdown_signal: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr();
        let router = build_router(self.state);

        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on http://{}", addr);
        info!("Tool endpoint: http://{}{}", addr, MCP_PATH);
        info!("Health check: http://{}/health", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        Ok(())
    }
}
