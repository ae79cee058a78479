//! Tool catalog for extforge.
//!
//! Tools give the agent the ability to change the extension it is building:
//! edit files, search them, run commands, build and preview, read logs.
//! Every tool acts through a `ToolExecutionContext`, so the catalog runs
//! unchanged against the browser sandbox or a [`LocalWorkspace`].

pub mod files;
pub mod local;
pub mod path;
pub mod process;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use local::LocalWorkspace;
pub use registry::{Tool, ToolRegistry};

/// Create the registry holding the full built-in catalog.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(files::WriteFileTool));
    registry.register(Box::new(files::ReadFileTool));
    registry.register(Box::new(files::DeleteFileTool));
    registry.register(Box::new(files::ListFilesTool));
    registry.register(Box::new(files::SearchFilesTool));
    registry.register(Box::new(process::RunCommandTool));
    registry.register(Box::new(process::BuildTool));
    registry.register(Box::new(process::StopPreviewTool));
    registry.register(Box::new(process::GetLogsTool));
    registry.register(Box::new(process::ClearLogsTool));
    registry
}
