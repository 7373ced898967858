//! JSON-RPC envelope encoding
//!
//! Provides the outbound envelope shapes and the mapping of `McpError` onto JSON-RPC
//! error objects.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Value};

use crate::mcp::error::McpError;

/// One outbound message, tagged with the correlation id of the request it answers.
#[derive(Debug)]
pub enum Reply {
    Result {
        id: Option<RequestId>,
        result: Value,
    },
    Error {
        id: Option<RequestId>,
        error: McpError,
    },
}

impl Reply {
    pub fn result(id: Option<RequestId>, result: Value) -> Self {
        Self::Result { id, result }
    }

    pub fn error(id: Option<RequestId>, error: McpError) -> Self {
        Self::Error { id, error }
    }

    pub fn encode(self) -> Value {
        match self {
            Self::Result { id, result } => json_rpc_result(id, result),
            Self::Error { id, error } => mcp_error_to_json_rpc(id, &error),
        }
    }
}

pub fn mcp_error_to_json_rpc(id: Option<RequestId>, err: &McpError) -> Value {
    json_rpc_error_with_data(
        id,
        err.rpc_code(),
        err.rpc_message(),
        Some(json!({
            "code": err.code(),
            "message": err.client_message(),
            "details": err.details(),
        })),
    )
}

pub fn json_rpc_error_with_data(
    id: Option<RequestId>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data: data.clone(),
            message: message.to_string(),
        },
        id.clone(),
    );

    serde_json::to_value(response).unwrap_or_else(|_| {
        json!({
            "jsonrpc": "2.0",
            "id": id.map(request_id_to_value),
            "error": {
                "code": code,
                "message": message,
                "data": data,
            }
        })
    })
}

/// Requests sent without an id are answered with `"id": null`.
pub fn json_rpc_result(id: Option<RequestId>, result: Value) -> Value {
    if let (Some(request_id), Some(extra)) = (id.clone(), result.as_object().cloned()) {
        let response = JsonrpcResultResponse::new(
            request_id,
            McpResult {
                meta: None,
                extra: Some(extra),
            },
        );
        if let Ok(encoded) = serde_json::to_value(response) {
            return encoded;
        }
    }

    json!({
        "jsonrpc": "2.0",
        "id": id.map(request_id_to_value),
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}
