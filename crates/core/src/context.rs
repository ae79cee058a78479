//! Tool execution context: the host capability set tools act through.
//!
//! The engine never assumes how these are implemented. It requires only that
//! each call settles and that `get_files()` reflects a prior `write_file` or
//! `set_files` before the next tool in the same batch reads it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;

/// Path → content map of the artifact being built.
pub type FileMap = HashMap<String, String>;

/// Output of a command run inside the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Whether the build reached "complete"
    pub success: bool,

    /// Preview URL, when the context serves one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,

    /// Build duration in milliseconds, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Failure message when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The capability set the orchestration engine needs from its host.
#[async_trait]
pub trait ToolExecutionContext: Send + Sync {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), ToolError>;

    async fn read_file(&self, path: &str) -> Result<String, ToolError>;

    async fn delete_file(&self, path: &str) -> Result<(), ToolError>;

    /// List paths, optionally restricted to a directory prefix.
    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, ToolError>;

    async fn get_files(&self) -> Result<FileMap, ToolError>;

    async fn set_files(&self, files: FileMap) -> Result<(), ToolError>;

    async fn build(&self, files: FileMap, install_deps: bool) -> Result<BuildOutcome, ToolError>;

    async fn stop(&self) -> Result<(), ToolError>;

    async fn is_running(&self) -> bool;

    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, ToolError>;

    async fn get_logs(&self) -> Vec<String>;

    async fn clear_logs(&self);

    async fn write_to_terminal(&self, data: &str) -> Result<(), ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_output_success() {
        let ok = CommandOutput { exit_code: 0, output: "done".into() };
        let bad = CommandOutput { exit_code: 2, output: "nope".into() };
        assert!(ok.success());
        assert!(!bad.success());
    }

    #[test]
    fn build_outcome_defaults_to_failure() {
        let outcome = BuildOutcome::default();
        assert!(!outcome.success);
        assert!(outcome.preview_url.is_none());
    }
}
