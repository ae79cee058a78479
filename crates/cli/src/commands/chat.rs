//! `extforge chat`: interactive or single-message build session.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use extforge_agent::{AgentLoop, AiServiceResult};
use extforge_config::AppConfig;
use extforge_core::event::DomainEvent;
use extforge_core::message::Conversation;
use extforge_tools::LocalWorkspace;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    message: Option<String>,
    dir: Option<PathBuf>,
    provider_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(name) = provider_override {
        config.default_provider = name;
    }

    let router = extforge_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Unknown provider '{}'", config.default_provider))?;

    // Give a clear error before the first turn fails
    if !provider.is_configured() {
        eprintln!();
        eprintln!("  ERROR: provider '{}' has no API key or proxy configured!", provider.name());
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, OPENROUTER_API_KEY");
        eprintln!("    EXTFORGE_API_KEY   (used by the default provider)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No credentials for the selected provider. See above for setup instructions.".into());
    }

    let root = project_root(dir, &config)?;
    let workspace = Arc::new(LocalWorkspace::from_config(root.clone(), &config.workspace));
    let tools = Arc::new(extforge_tools::default_registry());
    let agent = AgentLoop::new(provider.clone(), tools.clone(), workspace).with_settings(&config.agent);

    spawn_progress_printer(&agent);

    let mut conversation = Conversation::new();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let result = agent.chat(&mut conversation, &msg).await;
        eprint!("\r              \r");
        print_result(&result?);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  extforge: interactive mode");
    println!();
    println!("  Provider:  {}", provider.name());
    println!("  Model:     {}", config.model_for(&config.default_provider));
    println!("  Project:   {}", root.display());
    println!("  Tools:     {}", tools.names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C stops the current turn. Type 'exit' to quit.");
    println!();

    let cancel = agent.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !cancel.cancel() {
                println!();
                std::process::exit(0);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match agent.chat(&mut conversation, line).await {
            Ok(result) => {
                println!();
                print_result(&result);
                println!();
            }
            Err(e) if e.is_cancelled() => println!("\n  [Stopped]\n"),
            Err(e) => eprintln!("  [Error] {e}\n"),
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// The project directory: `--dir`, then `workspace.root`, then the current directory.
fn project_root(dir: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let root = match dir {
        Some(dir) => dir,
        None => match &config.workspace.root {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?,
        },
    };
    if !root.is_dir() {
        std::fs::create_dir_all(&root)?;
    }
    Ok(root)
}

fn spawn_progress_printer(agent: &AgentLoop) {
    let mut events = agent.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                DomainEvent::ToolCallStarted { tool_name, arguments, .. } => {
                    eprintln!("  ⚙ {}", describe_call(tool_name, arguments));
                }
                DomainEvent::ToolExecuted { tool_name, success: false, .. } => {
                    eprintln!("  ✗ {tool_name} failed");
                }
                _ => {}
            }
        }
    });
}

fn describe_call(tool_name: &str, arguments: &serde_json::Value) -> String {
    let target = ["file_path", "path", "directory", "query", "command"]
        .iter()
        .find_map(|key| arguments.get(*key).and_then(|v| v.as_str()));
    match target {
        Some(target) => format!("{tool_name} {target}"),
        None => tool_name.to_string(),
    }
}

fn print_result(result: &AiServiceResult) {
    for line in result.response.lines() {
        println!("  Assistant > {line}");
    }
    if !result.modified_files.is_empty() {
        println!();
        println!("  Changed:  {}", result.modified_files.join(", "));
    }
    if let Some(url) = &result.preview_url {
        println!("  Preview:  {url}");
    }
    for error in &result.errors {
        eprintln!("  [Warning] {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describe_call_uses_first_target_argument() {
        assert_eq!(
            describe_call("write_file", &json!({"file_path": "popup.js", "content": "x"})),
            "write_file popup.js"
        );
        assert_eq!(describe_call("run_command", &json!({"command": "npm"})), "run_command npm");
        assert_eq!(describe_call("build", &json!({"install_deps": true})), "build");
    }

    #[test]
    fn project_root_prefers_flag_then_config() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("from-flag");
        let configured = dir.path().join("from-config");

        let mut config = AppConfig::default();
        config.workspace.root = Some(configured.display().to_string());

        let root = project_root(Some(flag.clone()), &config).unwrap();
        assert_eq!(root, flag);
        assert!(flag.is_dir());

        let root = project_root(None, &config).unwrap();
        assert_eq!(root, configured);
    }
}
