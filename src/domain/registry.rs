//! Tool registry: name → (metadata, schema, handler)
//!
//! Definitions are registered once at startup and shared read-only by every session.
//! A handler can only be reached through a [`PreparedCall`], which exists only after the
//! arguments have passed schema validation.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::{
    content::InvocationResult,
    schema::{validate, Schema, ValidationFailure},
};
use crate::logging::{EventLevel, EventSink};

const CONTEXT: &str = "ToolRegistry";

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<InvocationResult, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<InvocationResult, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<InvocationResult, ToolError> {
        (self.0)(arguments).await
    }
}

/// Failure reported by a tool handler.
///
/// The message reaches the client only when the handler marks it as safe to expose;
/// otherwise the client sees a generic failure and the message and source are logged.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolError {
    message: String,
    expose: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expose: false,
            source: None,
        }
    }

    pub fn exposed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expose: true,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_exposed(&self) -> bool {
        self.expose
    }

    /// The message followed by every underlying cause, for logs.
    pub fn detailed(&self) -> String {
        let mut detail = self.message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(error) = cause {
            detail.push_str(": ");
            detail.push_str(&error.to_string());
            cause = error.source();
        }
        detail
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("tool already registered: {name}")]
    DuplicateTool { name: String },
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("invalid arguments for tool {tool}: {failure}")]
    InvalidArguments {
        tool: String,
        failure: ValidationFailure,
    },
    #[error("tool {tool} failed: {source}")]
    HandlerError {
        tool: String,
        #[source]
        source: ToolError,
    },
}

pub struct ToolDefinition {
    name: String,
    title: String,
    description: String,
    input_schema: Schema,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        input_schema: impl Into<Schema>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: description.into(),
            input_schema: input_schema.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        input_schema: impl Into<Schema>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<InvocationResult, ToolError>> + Send + 'static,
    {
        Self::new(name, title, description, input_schema, FnHandler(handler))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_json_schema(),
        }
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Public metadata of a tool, as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: Value,
}

pub struct ToolRegistry {
    tools: Vec<Arc<ToolDefinition>>,
    index: HashMap<String, usize>,
    events: Arc<dyn EventSink>,
}

impl ToolRegistry {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            events,
        }
    }

    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), RegistrationError> {
        if self.index.contains_key(definition.name()) {
            return Err(RegistrationError::DuplicateTool {
                name: definition.name().to_string(),
            });
        }

        self.events.log(
            EventLevel::Debug,
            CONTEXT,
            "tool registered",
            Some(&json!({ "tool": definition.name() })),
        );
        self.index
            .insert(definition.name().to_string(), self.tools.len());
        self.tools.push(Arc::new(definition));
        Ok(())
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
        self.index.get(name).map(|position| &self.tools[*position])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks the tool up and validates `arguments` against its schema.
    ///
    /// Absent arguments are treated as an empty object.
    pub fn prepare(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<PreparedCall, InvocationError> {
        let Some(definition) = self.get(name) else {
            self.events.log(
                EventLevel::Info,
                CONTEXT,
                "unknown tool requested",
                Some(&json!({ "tool": name })),
            );
            return Err(InvocationError::UnknownTool {
                name: name.to_string(),
            });
        };

        let arguments = arguments.unwrap_or_else(|| Value::Object(Map::new()));
        let arguments = validate(definition.input_schema(), &arguments).map_err(|failure| {
            self.events.log(
                EventLevel::Info,
                CONTEXT,
                "tool arguments rejected",
                Some(&json!({ "tool": name, "issues": failure.issues })),
            );
            InvocationError::InvalidArguments {
                tool: name.to_string(),
                failure,
            }
        })?;

        Ok(PreparedCall {
            definition: Arc::clone(definition),
            arguments,
            events: Arc::clone(&self.events),
        })
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<InvocationResult, InvocationError> {
        self.prepare(name, arguments)?.run().await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// A tool call whose arguments have already been validated.
pub struct PreparedCall {
    definition: Arc<ToolDefinition>,
    arguments: Value,
    events: Arc<dyn EventSink>,
}

impl PreparedCall {
    pub fn tool_name(&self) -> &str {
        self.definition.name()
    }

    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    pub async fn run(self) -> Result<InvocationResult, InvocationError> {
        let Self {
            definition,
            arguments,
            events,
        } = self;

        match definition.handler.call(arguments).await {
            Ok(result) => Ok(result),
            Err(source) => {
                events.log(
                    EventLevel::Warn,
                    CONTEXT,
                    "tool handler failed",
                    Some(&json!({
                        "tool": definition.name(),
                        "cause": source.detailed(),
                        "exposed": source.is_exposed(),
                    })),
                );
                Err(InvocationError::HandlerError {
                    tool: definition.name().to_string(),
                    source,
                })
            }
        }
    }
}
