//! Protocol-level failure taxonomy
//!
//! Every variant except `TransportClosed` maps onto a JSON-RPC error object; the string
//! `code()` travels in the error's `data` so clients can branch on it.

use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::registry::InvocationError;

pub const GENERIC_HANDLER_FAILURE: &str = "tool execution failed";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("method not found: {method}")]
    MethodNotFound { method: String },
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String, details: Value },
    /// `message` is already safe to show to the client.
    #[error("handler error: {message}")]
    HandlerError {
        tool: Option<String>,
        message: String,
    },
    #[error("transport closed")]
    TransportClosed,
}

impl McpError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidArguments {
            message: message.into(),
            details,
        }
    }

    pub fn handler(tool: Option<&str>, message: impl Into<String>) -> Self {
        Self::HandlerError {
            tool: tool.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMessage { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::UnknownTool { .. } => "tool_not_found",
            Self::InvalidArguments { .. } => "invalid_params",
            Self::HandlerError { .. } | Self::TransportClosed => "internal_error",
        }
    }

    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::MalformedMessage { .. } => -32700,
            Self::InvalidRequest { .. } => -32600,
            Self::MethodNotFound { .. } | Self::UnknownTool { .. } => -32601,
            Self::InvalidArguments { .. } => -32602,
            Self::HandlerError { .. } | Self::TransportClosed => -32603,
        }
    }

    pub fn rpc_message(&self) -> &'static str {
        match self {
            Self::MalformedMessage { .. } => "Parse error",
            Self::InvalidRequest { .. } => "Invalid Request",
            Self::MethodNotFound { .. } | Self::UnknownTool { .. } => "Method not found",
            Self::InvalidArguments { .. } => "Invalid params",
            Self::HandlerError { .. } | Self::TransportClosed => "Internal error",
        }
    }

    /// Message placed in the error's `data`; never carries an unexposed handler cause.
    pub fn client_message(&self) -> String {
        match self {
            Self::MalformedMessage { reason } | Self::InvalidRequest { reason } => reason.clone(),
            Self::MethodNotFound { .. } => "unknown method".to_string(),
            Self::UnknownTool { .. } => "unknown tool name".to_string(),
            Self::InvalidArguments { message, .. } | Self::HandlerError { message, .. } => {
                message.clone()
            }
            Self::TransportClosed => "internal server error".to_string(),
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::MethodNotFound { method } => json!({ "method": method }),
            Self::UnknownTool { name } => json!({ "name": name }),
            Self::InvalidArguments { details, .. } => details.clone(),
            Self::HandlerError {
                tool: Some(tool), ..
            } => json!({ "tool": tool }),
            _ => json!({}),
        }
    }
}

impl From<InvocationError> for McpError {
    fn from(error: InvocationError) -> Self {
        match error {
            InvocationError::UnknownTool { name } => Self::UnknownTool { name },
            InvocationError::InvalidArguments { tool, failure } => Self::invalid_arguments(
                format!("invalid arguments for tool {tool}"),
                json!({ "tool": tool, "issues": failure.issues }),
            ),
            InvocationError::HandlerError { tool, source } => {
                let message = if source.is_exposed() {
                    source.message().to_string()
                } else {
                    GENERIC_HANDLER_FAILURE.to_string()
                };
                Self::handler(Some(&tool), message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::ToolError;
    use crate::domain::schema::{FieldIssue, ValidationFailure};

    #[test]
    fn unexposed_handler_causes_stay_generic() {
        let error: McpError = InvocationError::HandlerError {
            tool: "echo".to_string(),
            source: ToolError::new("connection string postgres://secret"),
        }
        .into();

        assert_eq!(error.code(), "internal_error");
        assert_eq!(error.client_message(), GENERIC_HANDLER_FAILURE);
        assert_eq!(error.details(), json!({ "tool": "echo" }));
    }

    #[test]
    fn exposed_handler_messages_reach_the_client() {
        let error: McpError = InvocationError::HandlerError {
            tool: "echo".to_string(),
            source: ToolError::exposed("quota exceeded"),
        }
        .into();

        assert_eq!(error.client_message(), "quota exceeded");
    }

    #[test]
    fn invalid_arguments_carry_structured_issues() {
        let error: McpError = InvocationError::InvalidArguments {
            tool: "echo".to_string(),
            failure: ValidationFailure {
                issues: vec![FieldIssue {
                    path: "message".to_string(),
                    expected: "string".to_string(),
                    found: "number".to_string(),
                }],
            },
        }
        .into();

        assert_eq!(error.code(), "invalid_params");
        assert_eq!(error.rpc_code(), -32602);
        assert_eq!(error.details()["issues"][0]["path"], "message");
    }

    #[test]
    fn codes_follow_the_taxonomy() {
        assert_eq!(McpError::malformed("x").code(), "parse_error");
        assert_eq!(McpError::malformed("x").rpc_code(), -32700);
        assert_eq!(
            McpError::UnknownTool {
                name: "x".to_string()
            }
            .code(),
            "tool_not_found"
        );
        assert_eq!(
            McpError::MethodNotFound {
                method: "x".to_string()
            }
            .rpc_code(),
            -32601
        );
    }
}
