//! Tool trait and registry.
//!
//! A tool reads its arguments from a `ToolCall` and acts only through the
//! `ToolExecutionContext` it is handed, so the same catalog runs against
//! the browser sandbox or a local directory.

use async_trait::async_trait;
use extforge_core::context::ToolExecutionContext;
use extforge_core::error::ToolError;
use extforge_core::provider::ToolDefinition;
use extforge_core::tool::{ToolCall, ToolResult};
use tracing::{debug, warn};

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "write_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the call against the context.
    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tool catalog, in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// All tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a call. Never fails: unknown tools and tool errors become
    /// failed results addressed to the call.
    pub async fn execute(&self, call: &ToolCall, ctx: &dyn ToolExecutionContext) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return ToolResult::failed(&call.id, &call.name, ToolError::NotFound(call.name.clone()).to_string());
        };

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        match tool.execute(call, ctx).await {
            Ok(mut result) => {
                // Tools don't know which call they serve
                result.tool_call_id = call.id.clone();
                result.name = call.name.clone();
                result
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::failed(&call.id, &call.name, e.to_string())
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, ToolError> {
    call.str_arg(key)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Read the target file path (`file_path`, alias `path`).
pub(crate) fn required_path(call: &ToolCall) -> Result<&str, ToolError> {
    call.file_path()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))
}
