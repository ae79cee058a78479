//! Tool call and tool result value types.
//!
//! A `ToolCall` is the model asking for a capability; a `ToolResult` is what
//! the engine reports back. Exactly one result exists per call that reached
//! the engine, including calls that were skipped.

use serde::{Deserialize, Serialize};

/// A structured request from the model to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, vendor-assigned or engine-generated. Stable for one exchange.
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a call from a JSON value; non-object values become empty arguments.
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, value: serde_json::Value) -> Self {
        let arguments = match value {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self::new(id, name, arguments)
    }

    /// Generate an engine-side call id for vendors that do not assign one.
    pub fn generate_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    /// A string argument by key.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// The target path of a file tool. Accepts `file_path` and `path`.
    pub fn file_path(&self) -> Option<&str> {
        self.str_arg("file_path").or_else(|| self.str_arg("path"))
    }
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result answers
    pub tool_call_id: String,

    /// Name of the tool that was called
    pub name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Human/LLM-readable summary
    pub content: String,

    /// Error message when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Paths this call created, changed or deleted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_files: Vec<String>,

    /// Whether this call completed a build
    #[serde(default)]
    pub build_triggered: bool,

    /// Preview URL surfaced by a completed build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            success: true,
            content: content.into(),
            error: None,
            modified_files: Vec::new(),
            build_triggered: false,
            preview_url: None,
        }
    }

    /// A failed result.
    pub fn failed(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            success: false,
            content: format!("Error: {error}"),
            error: Some(error),
            modified_files: Vec::new(),
            build_triggered: false,
            preview_url: None,
        }
    }

    /// Record a file this call touched.
    pub fn with_modified_file(mut self, path: impl Into<String>) -> Self {
        self.modified_files.push(path.into());
        self
    }

    /// What the model reads as this tool's output.
    pub fn model_content(&self) -> String {
        match (&self.error, self.success) {
            (Some(err), false) if !self.content.contains(err.as_str()) => {
                format!("{}\nError: {err}", self.content)
            }
            _ => self.content.clone(),
        }
    }
}
