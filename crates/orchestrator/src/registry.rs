use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

/// Argument key the engine writes the caller's credential under before every dispatch
pub const CREDENTIAL_KEY: &str = "githubToken";

/// Executes one tool. Handlers receive the model's arguments with the credential injected.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> AgentResult<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult<Value>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        (self)(arguments).await
    }
}

/// A tool together with the handler that executes it
#[derive(Clone)]
pub struct ToolDefinition {
    pub tool: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new<H: ToolHandler + 'static>(tool: Tool, handler: H) -> Self {
        Self {
            tool,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }

    /// Check arguments against the declared input schema. Only the parts of JSON
    /// schema that tool declarations use are enforced: the top level object, required
    /// properties and primitive property types. The credential key is always allowed.
    pub fn validate(&self, arguments: &Value) -> AgentResult<()> {
        let Some(arguments) = arguments.as_object() else {
            return Err(AgentError::InvalidParameters(format!(
                "arguments for {} must be a JSON object",
                self.tool.name
            )));
        };

        let schema = &self.tool.input_schema;
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if field == CREDENTIAL_KEY {
                    continue;
                }
                if arguments.get(field).map_or(true, Value::is_null) {
                    return Err(AgentError::InvalidParameters(format!(
                        "missing required argument '{}' for {}",
                        field, self.tool.name
                    )));
                }
            }
        }

        let empty = Map::new();
        let properties = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .unwrap_or(&empty);
        for (key, value) in arguments {
            if key == CREDENTIAL_KEY || value.is_null() {
                continue;
            }
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !matches_type(value, expected) {
                return Err(AgentError::InvalidParameters(format!(
                    "argument '{}' for {} must be of type {}",
                    key, self.tool.name, expected
                )));
            }
        }

        Ok(())
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

/// The set of tools offered to the model. Built once at startup and shared read-only
/// between requests.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names are unique; a second registration under the same name is refused.
    pub fn register(&mut self, definition: ToolDefinition) -> AgentResult<()> {
        if self.lookup(definition.name()).is_some() {
            return Err(AgentError::Internal(format!(
                "Duplicate tool name: {}",
                definition.name()
            )));
        }
        tracing::debug!(tool = definition.name(), "registered tool");
        self.tools.push(definition);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|definition| definition.name() == name)
    }

    /// Definitions in registration order
    pub fn list_all(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Tool declarations in registration order, as sent to the model
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|d| d.tool.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
