//! File tools: edit the artifact's file map.

use async_trait::async_trait;
use extforge_core::context::ToolExecutionContext;
use extforge_core::error::ToolError;
use extforge_core::tool::{ToolCall, ToolResult};

use crate::registry::{Tool, required_path, required_str};

/// Cap on `search_files` hits returned to the model.
const MAX_SEARCH_MATCHES: usize = 100;

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the extension project with the given content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "The complete file content"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let path = required_path(call)?;
        let content = required_str(call, "content")?;

        ctx.write_file(path, content).await?;

        Ok(ToolResult::ok(
            &call.id,
            &call.name,
            format!("Wrote {} bytes to {path}", content.len()),
        )
        .with_modified_file(path))
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file in the extension project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file relative to the project root"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let path = required_path(call)?;
        let content = ctx.read_file(path).await?;
        Ok(ToolResult::ok(&call.id, &call.name, content))
    }
}

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the extension project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file relative to the project root"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let path = required_path(call)?;
        ctx.delete_file(path).await?;
        Ok(ToolResult::ok(&call.id, &call.name, format!("Deleted {path}")).with_modified_file(path))
    }
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files in the extension project, optionally under one directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Only list files under this directory"
                }
            }
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let directory = call.str_arg("directory").filter(|d| !d.is_empty() && *d != ".");
        let files = ctx.list_files(directory).await?;

        let content = if files.is_empty() {
            "No files found".to_string()
        } else {
            files.join("\n")
        };
        Ok(ToolResult::ok(&call.id, &call.name, content))
    }
}

pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search all project files for a text query (case-insensitive). Returns matching lines as path:line: text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to search for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let query = required_str(call, "query")?;
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("'query' must not be empty".into()));
        }

        let files = ctx.get_files().await?;
        let matches = search(&files, query);

        let content = if matches.is_empty() {
            format!("No matches for '{query}'")
        } else if matches.len() > MAX_SEARCH_MATCHES {
            let total = matches.len();
            let mut shown = matches[..MAX_SEARCH_MATCHES].join("\n");
            shown.push_str(&format!("\n... {} more matches", total - MAX_SEARCH_MATCHES));
            shown
        } else {
            matches.join("\n")
        };
        Ok(ToolResult::ok(&call.id, &call.name, content))
    }
}

fn search(files: &extforge_core::context::FileMap, query: &str) -> Vec<String> {
    let needle = query.to_lowercase();
    let mut paths: Vec<&String> = files.keys().collect();
    paths.sort();

    let mut matches = Vec::new();
    for path in paths {
        for (index, line) in files[path].lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                matches.push(format!("{path}:{}: {}", index + 1, line.trim()));
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockContext;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::from_value("call_1", name, args)
    }

    #[tokio::test]
    async fn write_records_modified_file() {
        let ctx = MockContext::default();
        let result = WriteFileTool
            .execute(
                &call("write_file", serde_json::json!({"file_path": "popup.js", "content": "X"})),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.modified_files, vec!["popup.js"]);
        assert_eq!(ctx.files.lock().unwrap()["popup.js"], "X");
    }

    #[tokio::test]
    async fn write_accepts_path_alias() {
        let ctx = MockContext::default();
        WriteFileTool
            .execute(&call("write_file", serde_json::json!({"path": "a.txt", "content": ""})), &ctx)
            .await
            .unwrap();
        assert!(ctx.files.lock().unwrap().contains_key("a.txt"));
    }

    #[tokio::test]
    async fn write_without_content_is_rejected() {
        let ctx = MockContext::default();
        let err = WriteFileTool
            .execute(&call("write_file", serde_json::json!({"file_path": "a.txt"})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn read_missing_file_errors() {
        let ctx = MockContext::default();
        let err = ReadFileTool
            .execute(&call("read_file", serde_json::json!({"file_path": "nope.js"})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn delete_records_modified_file() {
        let ctx = MockContext::with_files(&[("old.js", "x")]);
        let result = DeleteFileTool
            .execute(&call("delete_file", serde_json::json!({"file_path": "old.js"})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.modified_files, vec!["old.js"]);
        assert!(ctx.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_with_directory_filter() {
        let ctx = MockContext::with_files(&[("src/a.js", ""), ("src/b.js", ""), ("manifest.json", "")]);
        let result = ListFilesTool
            .execute(&call("list_files", serde_json::json!({"directory": "src"})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.content, "src/a.js\nsrc/b.js");

        let all = ListFilesTool
            .execute(&call("list_files", serde_json::json!({})), &ctx)
            .await
            .unwrap();
        assert_eq!(all.content.lines().count(), 3);
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let ctx = MockContext::with_files(&[
            ("popup.js", "const Title = 1;\nconsole.log(title);"),
            ("bg.js", "nothing here"),
        ]);
        let result = SearchFilesTool
            .execute(&call("search_files", serde_json::json!({"query": "TITLE"})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.content, "popup.js:1: const Title = 1;\npopup.js:2: console.log(title);");
    }

    #[tokio::test]
    async fn search_without_matches() {
        let ctx = MockContext::with_files(&[("a.js", "x")]);
        let result = SearchFilesTool
            .execute(&call("search_files", serde_json::json!({"query": "zzz"})), &ctx)
            .await
            .unwrap();
        assert!(result.content.starts_with("No matches"));
    }
}
