//! Axum HTTP handlers for the web server
//!
//! Provides the session endpoint and general metadata endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::errors::AppError;
use crate::mcp::{
    error::McpError,
    rpc::Reply,
    transport::{Exchange, Outbound, SessionTransport},
};
use crate::{AppState, MCP_ENDPOINT};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: MCP_ENDPOINT,
    })
}

/// Runs one stateless session per request.
///
/// The session runs on its own task. If the client disconnects, this future is dropped,
/// the guard closes the transport, and the session observes the close and cancels.
/// A body that cannot be read (over the size limit, or a broken stream) is answered with
/// a `parse_error` reply like any other undecodable message.
pub async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let Some(permit) = state.sessions.try_begin() else {
        return Err(AppError::unavailable());
    };

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(
                status = rejection.status().as_u16(),
                error = %rejection,
                "request body rejected"
            );
            let reply = Reply::error(
                None,
                McpError::malformed(format!("request body could not be read: {rejection}")),
            );
            return Ok((StatusCode::OK, Json(reply.encode())).into_response());
        }
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    let (transport, reply) = SessionTransport::open(Exchange::new(content_type, body));
    let _close_on_disconnect = transport.close_on_drop();

    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        let _permit = permit;
        // Closes the transport even if the session task unwinds, so the reply wait ends.
        let _release = transport.close_on_drop();
        dispatcher.run_session(transport).await
    });

    match reply.recv().await {
        Some(Outbound::Message(body)) => Ok((StatusCode::OK, Json(body)).into_response()),
        Some(Outbound::Accepted) => Ok(StatusCode::NO_CONTENT.into_response()),
        None => Err(AppError::internal("session closed without writing a reply")),
    }
}
