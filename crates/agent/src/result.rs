//! The outcome of one `chat()` turn.

use extforge_core::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// Everything one turn produced, returned once when the turn ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiServiceResult {
    /// Final text shown to the user
    pub response: String,

    /// Every call the model requested, in order
    pub tool_calls: Vec<ToolCall>,

    /// One result per call, in call order
    pub tool_results: Vec<ToolResult>,

    /// Paths changed during the turn, first touch first
    pub modified_files: Vec<String>,

    pub build_triggered: bool,

    /// Last preview URL surfaced by a build
    pub preview_url: Option<String>,

    pub errors: Vec<String>,

    /// Provider calls made
    pub iterations: u32,
}

impl AiServiceResult {
    /// Fold one tool result into the turn totals.
    pub(crate) fn absorb(&mut self, result: &ToolResult) {
        for path in &result.modified_files {
            if !self.modified_files.contains(path) {
                self.modified_files.push(path.clone());
            }
        }
        if result.build_triggered {
            self.build_triggered = true;
        }
        if result.preview_url.is_some() {
            self.preview_url = result.preview_url.clone();
        }
        if !result.success {
            let reason = result.error.as_deref().unwrap_or("failed");
            self.errors.push(format!("{}: {reason}", result.name));
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_dedups_files_and_records_failures() {
        let mut result = AiServiceResult::default();
        result.absorb(&ToolResult::ok("1", "write_file", "ok").with_modified_file("a.js"));
        result.absorb(&ToolResult::ok("2", "write_file", "ok").with_modified_file("b.js"));
        result.absorb(&ToolResult::ok("3", "write_file", "ok").with_modified_file("a.js"));
        result.absorb(&ToolResult::failed("4", "read_file", "File not found: c.js"));

        assert_eq!(result.modified_files, vec!["a.js", "b.js"]);
        assert_eq!(result.errors, vec!["read_file: File not found: c.js"]);
        assert!(!result.build_triggered);
    }

    #[test]
    fn absorb_keeps_last_preview_url() {
        let mut result = AiServiceResult::default();
        let mut build = ToolResult::ok("1", "build", "done");
        build.build_triggered = true;
        build.preview_url = Some("http://a".into());
        result.absorb(&build);
        build.preview_url = Some("http://b".into());
        result.absorb(&build);

        assert!(result.build_triggered);
        assert_eq!(result.preview_url.as_deref(), Some("http://b"));
    }
}
