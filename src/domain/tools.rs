//! Tools exposed by this server
//!
//! Provides the `echo` tool and the process-wide registry built from it at startup.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{
    content::InvocationResult,
    registry::{RegistrationError, ToolDefinition, ToolError, ToolHandler, ToolRegistry},
    schema::{ObjectSchema, Schema},
};
use crate::logging::EventSink;

pub const ECHO_TOOL: &str = "echo";

#[derive(Debug, Deserialize)]
struct EchoArgs {
    message: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTool;

impl EchoTool {
    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(
            ECHO_TOOL,
            "Echo Tool",
            "Echoes back the provided message",
            ObjectSchema::new().described_property(
                "message",
                "Message to echo back",
                Schema::string(),
            ),
            EchoTool,
        )
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, arguments: Value) -> Result<InvocationResult, ToolError> {
        let args: EchoArgs = serde_json::from_value(arguments)
            .map_err(|err| ToolError::new("echo arguments could not be decoded").with_source(err))?;

        Ok(InvocationResult::text(format!("Tool echo: {}", args.message)))
    }
}

pub fn builtin_registry(events: Arc<dyn EventSink>) -> Result<ToolRegistry, RegistrationError> {
    let mut registry = ToolRegistry::new(events);
    registry.register(EchoTool::definition())?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::content::Content;
    use crate::logging::TracingSink;

    #[tokio::test]
    async fn echo_prefixes_the_message() {
        let registry = builtin_registry(Arc::new(TracingSink)).expect("builtin tools register");

        let result = registry
            .invoke(ECHO_TOOL, Some(json!({ "message": "hi" })))
            .await
            .expect("echo succeeds");

        assert_eq!(
            result.content,
            vec![Content::Text {
                text: "Tool echo: hi".to_string()
            }]
        );
    }

    #[test]
    fn echo_is_listed_with_its_metadata() {
        let registry = builtin_registry(Arc::new(TracingSink)).expect("builtin tools register");
        let tools = registry.list();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].title, "Echo Tool");
        assert_eq!(tools[0].description, "Echoes back the provided message");
        assert_eq!(
            tools[0].input_schema["properties"]["message"]["type"],
            "string"
        );
    }
}
