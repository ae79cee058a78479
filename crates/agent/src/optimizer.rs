//! Tool call optimizer: drops repeated and no-op calls before execution.
//!
//! Signatures are recorded when a call is slated for execution, so a burst of
//! identical calls inside one response collapses to a single execution.
//! No-op writes are judged against the files as they will be once the earlier
//! calls in the same batch have run.

use std::collections::HashSet;

use extforge_core::context::FileMap;
use extforge_core::tool::{ToolCall, ToolResult};
use tracing::debug;

/// Serialize a value with object keys sorted at every depth.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Stable identity of a call: its name plus canonical arguments.
pub fn signature(call: &ToolCall) -> String {
    format!(
        "{}{}",
        call.name,
        canonical_json(&serde_json::Value::Object(call.arguments.clone()))
    )
}

/// One response's calls, split into what runs and what was answered already.
#[derive(Debug, Default)]
pub struct Partition {
    pub executable: Vec<ToolCall>,
    pub skipped_results: Vec<ToolResult>,
}

pub struct ToolCallOptimizer;

impl ToolCallOptimizer {
    /// Partition `calls` against the running `seen` set and current files.
    pub fn partition(calls: &[ToolCall], seen: &mut HashSet<String>, files: &FileMap) -> Partition {
        let mut partition = Partition::default();
        let mut projected = files.clone();

        for call in calls {
            let sig = signature(call);

            if seen.contains(&sig) {
                debug!(tool = %call.name, call_id = %call.id, "Skipping repeated tool call");
                partition.skipped_results.push(ToolResult::ok(
                    &call.id,
                    &call.name,
                    format!(
                        "Skipped: identical '{}' call was already executed in this turn. Its earlier result still applies.",
                        call.name
                    ),
                ));
                continue;
            }

            if let Some(path) = Self::noop_write_target(call, &projected) {
                debug!(path, call_id = %call.id, "Skipping no-op write");
                seen.insert(sig);
                partition.skipped_results.push(ToolResult::ok(
                    &call.id,
                    &call.name,
                    format!("Skipped: {path} already has exactly this content."),
                ));
                continue;
            }

            seen.insert(sig);
            Self::project(call, &mut projected);
            partition.executable.push(call.clone());
        }

        partition
    }

    /// Apply the file effect of a call slated for execution.
    fn project(call: &ToolCall, projected: &mut FileMap) {
        let Some(path) = call.file_path() else {
            return;
        };
        match call.name.as_str() {
            "write_file" => {
                if let Some(content) = call.str_arg("content") {
                    projected.insert(path.to_string(), content.to_string());
                }
            }
            "delete_file" => {
                projected.remove(path);
            }
            _ => {}
        }
    }

    /// The path of a `write_file` call whose content is already in place.
    fn noop_write_target<'a>(call: &'a ToolCall, files: &FileMap) -> Option<&'a str> {
        if call.name != "write_file" {
            return None;
        }
        let path = call.file_path()?;
        let content = call.str_arg("content")?;
        (files.get(path).map(String::as_str) == Some(content)).then_some(path)
    }
}
