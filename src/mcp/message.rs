//! Inbound protocol messages and their decoding from raw request bytes

use rust_mcp_sdk::schema::RequestId;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp::{error::McpError, rpc::value_to_request_id};

pub const JSON_RPC_VERSION: &str = "2.0";
pub const NOTIFICATION_PREFIX: &str = "notifications/";

#[derive(Debug, Clone)]
pub struct ProtocolMessage {
    /// Correlation id; `None` for notifications and for requests sent without one.
    pub id: Option<RequestId>,
    pub kind: MessageKind,
}

#[derive(Debug, Clone)]
pub enum MessageKind {
    Initialize { params: Value },
    Ping,
    ListTools,
    CallTool {
        name: String,
        arguments: Option<Value>,
    },
    /// Any `notifications/*` method sent without an id. Acknowledged without a body.
    Notification { method: String },
    /// A `notifications/*` method that carries an id; answered with `invalid_request`.
    NotificationWithId { method: String },
    Response { result: Value },
    ErrorResponse { code: i64, message: String },
    Unsupported { method: String },
}

impl MessageKind {
    pub fn method(&self) -> &str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Ping => "ping",
            Self::ListTools => "tools/list",
            Self::CallTool { .. } => "tools/call",
            Self::Notification { method }
            | Self::NotificationWithId { method }
            | Self::Unsupported { method } => method,
            Self::Response { .. } => "response",
            Self::ErrorResponse { .. } => "error_response",
        }
    }

    /// Parameters as they should appear in audit logs, before redaction.
    pub fn audit_params(&self) -> Value {
        match self {
            Self::Initialize { params } => params.clone(),
            Self::CallTool { name, arguments } => json!({
                "name": name,
                "arguments": arguments,
            }),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Decodes one message from an HTTP body.
///
/// `jsonrpc` and `id` are optional on input. A present content type must be
/// `application/json`.
pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<ProtocolMessage, McpError> {
    if let Some(content_type) = content_type {
        if !is_json_content_type(content_type) {
            return Err(McpError::malformed(format!(
                "unsupported content type: {content_type}"
            )));
        }
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(McpError::malformed("request body is empty"));
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| McpError::malformed("request body is not valid JSON"))?;

    if payload.is_array() {
        return Err(McpError::malformed("batch messages are not supported"));
    }
    if !payload.is_object() {
        return Err(McpError::malformed("message must be a JSON object"));
    }

    let envelope: RawEnvelope = serde_json::from_value(payload)
        .map_err(|err| McpError::malformed(format!("invalid message envelope: {err}")))?;

    if let Some(version) = envelope.jsonrpc.as_deref() {
        if version != JSON_RPC_VERSION {
            return Err(McpError::malformed(format!(
                "unsupported jsonrpc version: {version}"
            )));
        }
    }

    let id = match envelope.id {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value_to_request_id(&value)
                .ok_or_else(|| McpError::malformed("id must be a string or an integer"))?,
        ),
    };

    let kind = match (envelope.method, envelope.result, envelope.error) {
        (Some(method), _, _) => decode_method(method, envelope.params, id.is_some())?,
        (None, Some(result), _) => MessageKind::Response { result },
        (None, None, Some(error)) => MessageKind::ErrorResponse {
            code: error.code,
            message: error.message,
        },
        (None, None, None) => return Err(McpError::malformed("message has no method")),
    };

    Ok(ProtocolMessage { id, kind })
}

fn decode_method(
    method: String,
    params: Option<Value>,
    has_id: bool,
) -> Result<MessageKind, McpError> {
    let method = method.trim().to_string();
    if method.is_empty() {
        return Err(McpError::malformed("method must not be empty"));
    }

    let kind = match method.as_str() {
        "initialize" => MessageKind::Initialize {
            params: params.unwrap_or(Value::Null),
        },
        "ping" => MessageKind::Ping,
        "tools/list" => MessageKind::ListTools,
        "tools/call" => {
            let params: CallToolParams = params
                .and_then(|params| serde_json::from_value(params).ok())
                .ok_or_else(|| McpError::malformed("tools/call requires params.name"))?;
            MessageKind::CallTool {
                name: params.name,
                arguments: params.arguments,
            }
        }
        _ if method.starts_with(NOTIFICATION_PREFIX) && has_id => {
            MessageKind::NotificationWithId { method }
        }
        _ if method.starts_with(NOTIFICATION_PREFIX) => MessageKind::Notification { method },
        _ => MessageKind::Unsupported { method },
    };

    Ok(kind)
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::rpc::request_id_to_value;

    fn decode_json(body: &str) -> Result<ProtocolMessage, McpError> {
        decode(Some("application/json"), body.as_bytes())
    }

    #[test]
    fn decodes_call_without_jsonrpc_or_id() {
        let message = decode_json(
            r#"{"method":"tools/call","params":{"name":"echo","arguments":{"message":"ping"}}}"#,
        )
        .expect("lenient envelope");

        assert!(message.id.is_none());
        let MessageKind::CallTool { name, arguments } = message.kind else {
            panic!("expected tools/call");
        };
        assert_eq!(name, "echo");
        assert_eq!(arguments, Some(json!({ "message": "ping" })));
    }

    #[test]
    fn keeps_the_correlation_id() {
        let message = decode_json(r#"{"jsonrpc":"2.0","id":"req-9","method":"tools/list"}"#)
            .expect("valid request");
        assert_eq!(
            request_id_to_value(message.id.expect("id present")),
            json!("req-9")
        );
        assert!(matches!(message.kind, MessageKind::ListTools));
    }

    #[test]
    fn rejects_garbage_and_empty_bodies() {
        for body in ["", "   ", "not json", "[1,2]", "42", r#"{"id":1}"#] {
            let error = decode_json(body).expect_err("must be malformed");
            assert_eq!(error.code(), "parse_error", "body: {body:?}");
        }
    }

    #[test]
    fn rejects_wrong_content_type() {
        let error = decode(Some("text/plain"), br#"{"method":"ping"}"#)
            .expect_err("content type must be json");
        assert!(matches!(error, McpError::MalformedMessage { .. }));

        assert!(decode(Some("application/json; charset=utf-8"), br#"{"method":"ping"}"#).is_ok());
        assert!(decode(None, br#"{"method":"ping"}"#).is_ok());
    }

    #[test]
    fn rejects_invalid_envelope_fields() {
        assert!(decode_json(r#"{"jsonrpc":"1.0","method":"ping"}"#).is_err());
        assert!(decode_json(r#"{"id":1.5,"method":"ping"}"#).is_err());
        assert!(decode_json(r#"{"method":42}"#).is_err());
        assert!(decode_json(r#"{"method":"  "}"#).is_err());
        assert!(decode_json(r#"{"method":"tools/call","params":{}}"#).is_err());
        assert!(decode_json(r#"{"method":"tools/call"}"#).is_err());
    }

    #[test]
    fn classifies_notifications_and_unknown_methods() {
        let message = decode_json(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .expect("notification");
        assert!(matches!(message.kind, MessageKind::Notification { .. }));

        let message =
            decode_json(r#"{"jsonrpc":"2.0","id":2,"method":"notifications/initialized"}"#)
                .expect("notification carrying an id still decodes");
        assert!(matches!(
            message.kind,
            MessageKind::NotificationWithId { .. }
        ));

        let message = decode_json(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
            .expect("unknown method still decodes");
        assert_eq!(message.kind.method(), "resources/list");
        assert!(matches!(message.kind, MessageKind::Unsupported { .. }));
    }

    #[test]
    fn decodes_inbound_responses() {
        let message = decode_json(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).expect("response");
        assert!(matches!(message.kind, MessageKind::Response { .. }));

        let message =
            decode_json(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"x"}}"#)
                .expect("error response");
        assert!(matches!(
            message.kind,
            MessageKind::ErrorResponse { code: -1, .. }
        ));
    }
}
