//! In-memory execution context for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use extforge_core::context::{BuildOutcome, CommandOutput, FileMap, ToolExecutionContext};
use extforge_core::error::ToolError;

#[derive(Default)]
pub struct MockContext {
    pub files: Mutex<FileMap>,
    pub logs: Mutex<Vec<String>>,
    pub build_outcome: Mutex<BuildOutcome>,
    pub builds: Mutex<Vec<bool>>,
    pub commands: Mutex<Vec<String>>,
    pub stopped: Mutex<bool>,
}

impl MockContext {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let ctx = Self::default();
        *ctx.files.lock().unwrap() = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        ctx
    }
}

#[async_trait]
impl ToolExecutionContext for MockContext {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), ToolError> {
        self.files.lock().unwrap().insert(path.into(), content.into());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, ToolError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ToolError::FileNotFound(path.into()))
    }

    async fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ToolError::FileNotFound(path.into()))
    }

    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, ToolError> {
        let mut paths: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| directory.is_none_or(|d| p.starts_with(d)))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn get_files(&self) -> Result<FileMap, ToolError> {
        Ok(self.files.lock().unwrap().clone())
    }

    async fn set_files(&self, files: FileMap) -> Result<(), ToolError> {
        *self.files.lock().unwrap() = files;
        Ok(())
    }

    async fn build(&self, _files: FileMap, install_deps: bool) -> Result<BuildOutcome, ToolError> {
        self.builds.lock().unwrap().push(install_deps);
        Ok(self.build_outcome.lock().unwrap().clone())
    }

    async fn stop(&self) -> Result<(), ToolError> {
        *self.stopped.lock().unwrap() = true;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        !*self.stopped.lock().unwrap()
    }

    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
        let line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.commands.lock().unwrap().push(line.clone());
        if command == "false" {
            return Ok(CommandOutput { exit_code: 1, output: "failed".into() });
        }
        Ok(CommandOutput { exit_code: 0, output: line })
    }

    async fn get_logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    async fn clear_logs(&self) {
        self.logs.lock().unwrap().clear();
    }

    async fn write_to_terminal(&self, data: &str) -> Result<(), ToolError> {
        self.logs.lock().unwrap().push(data.into());
        Ok(())
    }
}
