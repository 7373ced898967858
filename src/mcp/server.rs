//! Session-scoped protocol server
//!
//! Provides capability negotiation (`initialize`), tool listing, and the validated entry
//! point for tool calls. One `SessionServer` is built per session on top of the shared,
//! read-only tool registry.

use std::sync::Arc;

use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ProtocolVersion, ServerCapabilities, ServerCapabilitiesTools,
};
use serde_json::{json, Value};

use crate::domain::registry::{PreparedCall, ToolRegistry};
use crate::mcp::error::McpError;

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Name, version and description reported in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("Tool invocation server".to_string()),
        }
    }
}

pub struct SessionServer {
    identity: Arc<ServerIdentity>,
    registry: Arc<ToolRegistry>,
}

impl SessionServer {
    pub fn new(identity: Arc<ServerIdentity>, registry: Arc<ToolRegistry>) -> Self {
        Self { identity, registry }
    }

    pub fn initialize(&self, params: &Value) -> Result<Value, McpError> {
        let protocol_version = negotiate_protocol_version(Some(params))?;

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: self.identity.name.clone(),
                version: self.identity.version.clone(),
                title: None,
                description: self.identity.description.clone(),
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: None,
                prompts: None,
                ..Default::default()
            },
            protocol_version: protocol_version.into(),
            instructions: None,
            meta: None,
        };

        serde_json::to_value(initialize_result)
            .map_err(|err| McpError::handler(None, format!("initialize result encoding: {err}")))
    }

    pub fn list_tools(&self) -> Value {
        json!({ "tools": self.registry.list() })
    }

    pub fn prepare_call(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<PreparedCall, McpError> {
        self.registry
            .prepare(name, arguments)
            .map_err(McpError::from)
    }
}

/// Picks the protocol version for a session.
///
/// The client must offer a version. When it offers one this server does not speak, the
/// server answers with its own and leaves the decision to disconnect to the client.
pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, McpError> {
    params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            McpError::invalid_arguments(
                "initialize params.protocolVersion is required",
                json!({ "field": "protocolVersion" }),
            )
        })?;

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tools::builtin_registry;
    use crate::logging::TracingSink;

    fn server() -> SessionServer {
        let registry = builtin_registry(Arc::new(TracingSink)).expect("builtin tools");
        SessionServer::new(Arc::new(ServerIdentity::default()), Arc::new(registry))
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "echo",
            "arguments": {
                "message": "hello",
                "token": "should-not-appear",
                "api_key": "should-not-appear",
                "nested": {
                    "password": "should-not-appear"
                }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("echo"));
        assert_eq!(redacted["arguments"]["message"], json!("hello"));
        assert_eq!(redacted["arguments"]["token"], json!("[REDACTED]"));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["password"],
            json!("[REDACTED]")
        );
    }

    #[test]
    fn negotiate_protocol_version_accepts_supported_version() {
        let params = json!({ "protocolVersion": SUPPORTED_PROTOCOL_VERSION });

        let version = negotiate_protocol_version(Some(&params)).expect("supported version");
        assert_eq!(version, ProtocolVersion::V2024_11_05);
    }

    #[test]
    fn negotiate_protocol_version_answers_unknown_versions_with_its_own() {
        let params = json!({ "protocolVersion": "2026-01-01" });

        let version = negotiate_protocol_version(Some(&params)).expect("server picks version");
        assert_eq!(version, ProtocolVersion::V2024_11_05);
    }

    #[test]
    fn negotiate_protocol_version_requires_an_offer() {
        let error = negotiate_protocol_version(Some(&json!({}))).expect_err("missing version");
        assert_eq!(error.code(), "invalid_params");
    }

    #[test]
    fn initialize_reports_identity_and_tool_capability() {
        let result = server()
            .initialize(&json!({ "protocolVersion": SUPPORTED_PROTOCOL_VERSION }))
            .expect("initialize succeeds");

        assert_eq!(result["protocolVersion"], SUPPORTED_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(result["serverInfo"]["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[test]
    fn list_tools_wraps_registry_descriptors() {
        let listed = server().list_tools();
        assert_eq!(listed["tools"][0]["name"], "echo");
        assert_eq!(listed["tools"][0]["inputSchema"]["type"], "object");
    }

    #[test]
    fn prepare_call_maps_registry_failures() {
        let error = server()
            .prepare_call("nonexistent", None)
            .err()
            .expect("unknown tool");
        assert_eq!(error.code(), "tool_not_found");
    }
}
