//! Process tools: commands, builds, preview and logs.

use async_trait::async_trait;
use extforge_core::context::ToolExecutionContext;
use extforge_core::error::ToolError;
use extforge_core::tool::{ToolCall, ToolResult};
use tracing::info;

use crate::registry::{Tool, required_str};

/// Lines of log output returned by `get_logs`.
const MAX_LOG_LINES: usize = 200;

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a command in the project directory (e.g. npm install). Returns its exit code and output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The program to run"
                },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Arguments passed to the program"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let command = required_str(call, "command")?;
        let args: Vec<String> = match call.arguments.get("args") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(_) => {
                return Err(ToolError::InvalidArguments("'args' must be an array of strings".into()));
            }
        };

        let output = ctx.run_command(command, &args).await?;

        if output.success() {
            Ok(ToolResult::ok(&call.id, &call.name, output.output))
        } else {
            let mut result = ToolResult::failed(
                &call.id,
                &call.name,
                format!("'{command}' exited with code {}", output.exit_code),
            );
            result.content = output.output;
            Ok(result)
        }
    }
}

pub struct BuildTool;

#[async_trait]
impl Tool for BuildTool {
    fn name(&self) -> &str {
        "build"
    }

    fn description(&self) -> &str {
        "Build the extension from the current files and start its preview. Set install_deps when package.json dependencies changed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "install_deps": {
                    "type": "boolean",
                    "description": "Install dependencies before building"
                }
            }
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let install_deps = call
            .arguments
            .get("install_deps")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let files = ctx.get_files().await?;
        let outcome = ctx.build(files, install_deps).await?;

        if !outcome.success {
            let reason = outcome.error.unwrap_or_else(|| "Build failed".into());
            return Err(ToolError::ExecutionFailed {
                tool_name: "build".into(),
                reason,
            });
        }

        info!(preview_url = ?outcome.preview_url, duration_ms = ?outcome.duration_ms, "Build completed");

        let mut content = match outcome.duration_ms {
            Some(ms) => format!("Build succeeded in {ms}ms."),
            None => "Build succeeded.".to_string(),
        };
        if let Some(url) = &outcome.preview_url {
            content.push_str(&format!(" Preview: {url}"));
        }

        let mut result = ToolResult::ok(&call.id, &call.name, content);
        result.build_triggered = true;
        result.preview_url = outcome.preview_url;
        Ok(result)
    }
}

pub struct StopPreviewTool;

#[async_trait]
impl Tool for StopPreviewTool {
    fn name(&self) -> &str {
        "stop_preview"
    }

    fn description(&self) -> &str {
        "Stop the running extension preview."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        if !ctx.is_running().await {
            return Ok(ToolResult::ok(&call.id, &call.name, "Preview is not running"));
        }
        ctx.stop().await?;
        Ok(ToolResult::ok(&call.id, &call.name, "Preview stopped"))
    }
}

pub struct GetLogsTool;

#[async_trait]
impl Tool for GetLogsTool {
    fn name(&self) -> &str {
        "get_logs"
    }

    fn description(&self) -> &str {
        "Get recent build and runtime log output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let logs = ctx.get_logs().await;
        if logs.is_empty() {
            return Ok(ToolResult::ok(&call.id, &call.name, "No logs"));
        }
        let start = logs.len().saturating_sub(MAX_LOG_LINES);
        Ok(ToolResult::ok(&call.id, &call.name, logs[start..].join("\n")))
    }
}

pub struct ClearLogsTool;

#[async_trait]
impl Tool for ClearLogsTool {
    fn name(&self) -> &str {
        "clear_logs"
    }

    fn description(&self) -> &str {
        "Clear the collected log output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &dyn ToolExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        ctx.clear_logs().await;
        Ok(ToolResult::ok(&call.id, &call.name, "Logs cleared"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockContext;
    use extforge_core::context::BuildOutcome;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::from_value("call_1", name, args)
    }

    #[tokio::test]
    async fn run_command_passes_args() {
        let ctx = MockContext::default();
        let result = RunCommandTool
            .execute(
                &call("run_command", serde_json::json!({"command": "npm", "args": ["install", "lodash"]})),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(ctx.commands.lock().unwrap()[0], "npm install lodash");
    }

    #[tokio::test]
    async fn nonzero_exit_is_failed_result_with_output() {
        let ctx = MockContext::default();
        let result = RunCommandTool
            .execute(&call("run_command", serde_json::json!({"command": "false"})), &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.content, "failed");
        assert!(result.error.unwrap().contains("code 1"));
    }

    #[tokio::test]
    async fn bad_args_type_is_rejected() {
        let ctx = MockContext::default();
        let err = RunCommandTool
            .execute(&call("run_command", serde_json::json!({"command": "ls", "args": "-la"})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn successful_build_surfaces_preview() {
        let ctx = MockContext::default();
        *ctx.build_outcome.lock().unwrap() = BuildOutcome {
            success: true,
            preview_url: Some("http://localhost:5173".into()),
            duration_ms: Some(850),
            error: None,
        };
        let result = BuildTool
            .execute(&call("build", serde_json::json!({"install_deps": true})), &ctx)
            .await
            .unwrap();
        assert!(result.build_triggered);
        assert_eq!(result.preview_url.as_deref(), Some("http://localhost:5173"));
        assert!(result.content.contains("850ms"));
        assert_eq!(*ctx.builds.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn failed_build_is_error() {
        let ctx = MockContext::default();
        *ctx.build_outcome.lock().unwrap() = BuildOutcome {
            success: false,
            error: Some("Syntax error in popup.js".into()),
            ..BuildOutcome::default()
        };
        let err = BuildTool
            .execute(&call("build", serde_json::json!({})), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Syntax error"));
    }

    #[tokio::test]
    async fn stop_preview_when_running() {
        let ctx = MockContext::default();
        let result = StopPreviewTool
            .execute(&call("stop_preview", serde_json::json!({})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.content, "Preview stopped");
        assert!(*ctx.stopped.lock().unwrap());
    }

    #[tokio::test]
    async fn get_and_clear_logs() {
        let ctx = MockContext::default();
        ctx.logs.lock().unwrap().extend(["[build] ok".to_string(), "[runtime] loaded".to_string()]);

        let result = GetLogsTool.execute(&call("get_logs", serde_json::json!({})), &ctx).await.unwrap();
        assert_eq!(result.content, "[build] ok\n[runtime] loaded");

        ClearLogsTool.execute(&call("clear_logs", serde_json::json!({})), &ctx).await.unwrap();
        let result = GetLogsTool.execute(&call("get_logs", serde_json::json!({})), &ctx).await.unwrap();
        assert_eq!(result.content, "No logs");
    }
}
