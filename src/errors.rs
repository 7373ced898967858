use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// HTTP-level failures. Protocol errors never use this type; they travel as JSON-RPC
/// error replies with status 200.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String },
    #[error("unavailable: {message}")]
    Unavailable {
        code: &'static str,
        message: &'static str,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self::Unavailable {
            code: "unavailable",
            message: "server is shutting down",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
            Self::Unavailable { code, message } => {
                (StatusCode::SERVICE_UNAVAILABLE, code, message.to_string())
            }
        };

        (
            status,
            Json(ErrorBody {
                error,
                code: Some(code.to_string()),
            }),
        )
            .into_response()
    }
}
