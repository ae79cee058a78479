//! Local workspace: runs the tool catalog against a directory on disk.
//!
//! Files live under the project root, commands run through `tokio::process`
//! with an allowlist and a timeout, and their output feeds the log buffer.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use extforge_config::WorkspaceConfig;
use extforge_core::context::{BuildOutcome, CommandOutput, FileMap, ToolExecutionContext};
use extforge_core::error::ToolError;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::path::{normalize, resolve_in_root};

/// Directories `list_files` and `get_files` never descend into.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "target"];

const LOG_CAPACITY: usize = 1000;

pub struct LocalWorkspace {
    root: PathBuf,
    allowed_commands: Vec<String>,
    install_command: String,
    build_command: String,
    command_timeout: Duration,
    logs: Mutex<VecDeque<String>>,
    running: AtomicBool,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(root, &WorkspaceConfig::default())
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &WorkspaceConfig) -> Self {
        Self {
            root: root.into(),
            allowed_commands: config.allowed_commands.clone(),
            install_command: config.install_command.clone(),
            build_command: config.build_command.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            logs: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        resolve_in_root(&self.root, path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "workspace".into(),
            reason: e.to_string(),
        })
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true; // No allowlist = all commands allowed
        }
        self.allowed_commands.iter().any(|a| a == command)
    }

    async fn log(&self, line: impl Into<String>) {
        let mut logs = self.logs.lock().await;
        if logs.len() == LOG_CAPACITY {
            logs.pop_front();
        }
        logs.push_back(line.into());
    }

    /// Relative paths of every file under `dir`, sorted.
    async fn walk(&self, dir: &Path) -> Result<Vec<String>, ToolError> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error("list_files", e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error("list_files", e))? {
                let file_type = entry.file_type().await.map_err(|e| io_error("list_files", e))?;
                let name = entry.file_name().to_string_lossy().to_string();
                if file_type.is_dir() {
                    if !SKIPPED_DIRS.contains(&name.as_str()) {
                        pending.push(entry.path());
                    }
                } else if file_type.is_file()
                    && let Ok(relative) = entry.path().strip_prefix(&self.root)
                {
                    files.push(normalize(&relative.to_string_lossy()));
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Run a configured command line such as "npm run build".
    async fn run_configured(&self, command_line: &str) -> Result<CommandOutput, ToolError> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let Some(program) = parts.next() else {
            return Err(ToolError::InvalidArguments("Empty command".into()));
        };
        let args: Vec<String> = parts.collect();
        self.spawn(&program, &args).await
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
        debug!(command, ?args, root = %self.root.display(), "Running command");

        let child = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.command_timeout, child)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: command.into(),
                timeout_secs: self.command_timeout.as_secs(),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: command.into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        for line in stdout.lines().chain(stderr.lines()) {
            self.log(format!("[{command}] {line}")).await;
        }
        if exit_code != 0 {
            warn!(command, exit_code, "Command failed");
        }

        let combined = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\n{}", stdout.trim(), stderr.trim()).trim().to_string()
        };

        Ok(CommandOutput { exit_code, output: combined })
    }
}

fn io_error(tool_name: &str, err: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl ToolExecutionContext for LocalWorkspace {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), ToolError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("write_file", e))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| io_error("write_file", e))
    }

    async fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let target = self.resolve(path)?;
        match tokio::fs::read_to_string(&target).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::FileNotFound(path.into())),
            Err(e) => Err(io_error("read_file", e)),
        }
    }

    async fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::FileNotFound(path.into())),
            Err(e) => Err(io_error("delete_file", e)),
        }
    }

    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, ToolError> {
        let dir = match directory {
            Some(d) => self.resolve(d)?,
            None => self.root.clone(),
        };
        self.walk(&dir).await
    }

    async fn get_files(&self) -> Result<FileMap, ToolError> {
        let mut files = FileMap::new();
        for path in self.walk(&self.root).await? {
            match tokio::fs::read_to_string(self.root.join(&path)).await {
                Ok(content) => {
                    files.insert(path, content);
                }
                // Binary assets are not part of the editable map
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {}
                Err(e) => return Err(io_error("get_files", e)),
            }
        }
        Ok(files)
    }

    async fn set_files(&self, files: FileMap) -> Result<(), ToolError> {
        for (path, content) in &files {
            self.write_file(path, content).await?;
        }
        Ok(())
    }

    async fn build(&self, files: FileMap, install_deps: bool) -> Result<BuildOutcome, ToolError> {
        let started = Instant::now();
        self.set_files(files).await?;

        if install_deps {
            self.log(format!("$ {}", self.install_command)).await;
            let output = self.run_configured(&self.install_command).await?;
            if !output.success() {
                return Ok(BuildOutcome {
                    success: false,
                    error: Some(format!("Dependency install failed:\n{}", output.output)),
                    ..BuildOutcome::default()
                });
            }
        }

        self.log(format!("$ {}", self.build_command)).await;
        let output = self.run_configured(&self.build_command).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !output.success() {
            return Ok(BuildOutcome {
                success: false,
                duration_ms: Some(duration_ms),
                error: Some(output.output),
                ..BuildOutcome::default()
            });
        }

        self.running.store(true, Ordering::SeqCst);
        let dist = self.root.join("dist");
        let preview_url = dist
            .exists()
            .then(|| format!("file://{}", dist.display()));

        info!(duration_ms, ?preview_url, "Local build completed");

        Ok(BuildOutcome {
            success: true,
            preview_url,
            duration_ms: Some(duration_ms),
            error: None,
        })
    }

    async fn stop(&self) -> Result<(), ToolError> {
        self.running.store(false, Ordering::SeqCst);
        self.log("[preview] stopped").await;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "run_command".into(),
                reason: format!("Command '{command}' not in allowlist"),
            });
        }
        self.spawn(command, args).await
    }

    async fn get_logs(&self) -> Vec<String> {
        self.logs.lock().await.iter().cloned().collect()
    }

    async fn clear_logs(&self) {
        self.logs.lock().await.clear();
    }

    async fn write_to_terminal(&self, data: &str) -> Result<(), ToolError> {
        self.log(format!("[terminal] {}", data.trim_end())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(dir: &tempfile::TempDir) -> LocalWorkspace {
        let config = WorkspaceConfig {
            allowed_commands: vec!["echo".into(), "sh".into()],
            build_command: "echo built".into(),
            install_command: "echo installed".into(),
            ..WorkspaceConfig::default()
        };
        LocalWorkspace::from_config(dir.path(), &config)
    }

    #[tokio::test]
    async fn write_read_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);

        ws.write_file("src/popup.js", "console.log(1)").await.unwrap();
        assert_eq!(ws.read_file("src/popup.js").await.unwrap(), "console.log(1)");
        assert!(dir.path().join("src/popup.js").exists());

        ws.delete_file("src/popup.js").await.unwrap();
        assert!(matches!(
            ws.read_file("src/popup.js").await.unwrap_err(),
            ToolError::FileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn escaping_paths_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let err = ws.write_file("../escape.txt", "x").await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn list_skips_dependency_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        ws.write_file("manifest.json", "{}").await.unwrap();
        ws.write_file("src/bg.js", "").await.unwrap();
        ws.write_file("node_modules/pkg/index.js", "").await.unwrap();

        assert_eq!(ws.list_files(None).await.unwrap(), vec!["manifest.json", "src/bg.js"]);
        assert_eq!(ws.list_files(Some("src")).await.unwrap(), vec!["src/bg.js"]);

        let files = ws.get_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["manifest.json"], "{}");
    }

    #[tokio::test]
    async fn disallowed_command_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let err = ws.run_command("rm", &["-rf".into()]).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let output = ws.run_command("echo", &["hello".into()]).await.unwrap();
        assert!(output.success());
        assert_eq!(output.output, "hello");
        assert_eq!(ws.get_logs().await, vec!["[echo] hello"]);

        ws.clear_logs().await;
        assert!(ws.get_logs().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn build_writes_files_and_runs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let mut files = FileMap::new();
        files.insert("manifest.json".into(), "{}".into());

        let outcome = ws.build(files, true).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.preview_url.is_none());
        assert!(ws.is_running().await);
        assert!(dir.path().join("manifest.json").exists());

        let logs = ws.get_logs().await;
        assert!(logs.contains(&"[echo] installed".to_string()));
        assert!(logs.contains(&"[echo] built".to_string()));

        ws.stop().await.unwrap();
        assert!(!ws.is_running().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_build_reports_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig {
            build_command: "sh -c exit_nonzero_missing_cmd".into(),
            ..WorkspaceConfig::default()
        };
        let ws = LocalWorkspace::from_config(dir.path(), &config);
        let outcome = ws.build(FileMap::new(), false).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
