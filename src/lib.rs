use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod mcp;

use lifecycle::SessionTracker;
use mcp::dispatcher::Dispatcher;

pub const MCP_ENDPOINT: &str = "/mcp/hello";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionTracker>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sessions: SessionTracker::new(),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(MCP_ENDPOINT, post(http::handlers::mcp_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
