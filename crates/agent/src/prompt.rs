//! System prompt resolution.

/// Built-in prompt used when no override is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are extforge, an assistant that builds and edits browser extensions.

You work on the user's extension project through tools:
- Use list_files, read_file and search_files to inspect the project before changing it.
- Use write_file with the complete new content of a file; never send partial files.
- Use build after changing files, setting install_deps when package.json dependencies changed.
- Use get_logs to diagnose build or runtime errors, then fix the cause.

Keep manifest.json valid (Manifest V3). Explain briefly what you changed when you are done.";

/// Resolve the prompt for one turn: override or default, plus the file listing.
pub fn build_system_prompt(prompt_override: Option<&str>, files: &[String]) -> String {
    let base = prompt_override
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut prompt = base.to_string();
    prompt.push_str("\n\n## Project files\n");
    if files.is_empty() {
        prompt.push_str("(the project is empty)\n");
    } else {
        for file in files {
            prompt.push_str("- ");
            prompt.push_str(file);
            prompt.push('\n');
        }
    }
    prompt
}
