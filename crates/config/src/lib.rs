//! Configuration loading, validation, and management for extforge.
//!
//! Loads configuration from `~/.extforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Vendor name → environment variable holding its API key.
const VENDOR_KEY_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
    ("groq", "GROQ_API_KEY"),
    ("deepseek", "DEEPSEEK_API_KEY"),
    ("together", "TOGETHER_API_KEY"),
    ("kimi", "MOONSHOT_API_KEY"),
];

/// The root configuration structure.
///
/// Maps directly to `~/.extforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key for providers without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Session token from the hosted identity backend, used for proxied calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Default AI provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Local workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Sandbox bridge settings
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("session_token", &redact(&self.session_token))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .field("workspace", &self.workspace)
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("proxy_url", &self.proxy_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the vendor's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Trusted server-side proxy used when no direct key is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum provider round trips per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Replace the built-in system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_iterations() -> u32 {
    20
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Project root for the local workspace (defaults to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    /// Commands `run_command` may start. Empty = allow all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_install_command")]
    pub install_command: String,

    #[serde(default = "default_build_command")]
    pub build_command: String,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_allowed_commands() -> Vec<String> {
    ["npm", "npx", "node", "ls", "cat", "echo", "git"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_install_command() -> String {
    "npm install".into()
}
fn default_build_command() -> String {
    "npm run build".into()
}
fn default_command_timeout() -> u64 {
    120
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            allowed_commands: default_allowed_commands(),
            install_command: default_install_command(),
            build_command: default_build_command(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    /// Maximum log lines kept by the sandbox context
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_handshake_timeout() -> u64 {
    10
}
fn default_build_timeout() -> u64 {
    300
}
fn default_log_capacity() -> usize {
    1000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            build_timeout_secs: default_build_timeout(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.extforge/config.toml).
    ///
    /// Environment variables override the file:
    /// - `EXTFORGE_API_KEY`, `EXTFORGE_SESSION_TOKEN`
    /// - `EXTFORGE_PROVIDER`, `EXTFORGE_MODEL`
    /// - per-vendor keys such as `OPENAI_API_KEY` and `ANTHROPIC_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read_file(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("EXTFORGE_API_KEY");
        }
        if self.session_token.is_none() {
            self.session_token = lookup("EXTFORGE_SESSION_TOKEN");
        }
        if let Some(provider) = lookup("EXTFORGE_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("EXTFORGE_MODEL") {
            self.default_model = model;
        }

        for (vendor, var) in VENDOR_KEY_VARS {
            let Some(key) = lookup(var) else { continue };
            let entry = self.providers.entry((*vendor).to_string()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = Some(key);
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".extforge")
    }

    /// The API key for a provider: its own, else the global one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// The model for a provider: its own default, else the global default.
    pub fn model_for(&self, provider: &str) -> String {
        self.providers
            .get(provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.sandbox.build_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "sandbox.build_timeout_secs must be > 0".into(),
            ));
        }

        for warning in self.warnings() {
            tracing::warn!("{warning}");
        }

        Ok(())
    }

    /// Problems that do not stop extforge from starting.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workspace.allowed_commands.is_empty() {
            warnings.push(
                "workspace.allowed_commands is empty: run_command will accept every command".into(),
            );
        }

        if self.api_key_for(&self.default_provider).is_none()
            && self
                .providers
                .get(&self.default_provider)
                .is_none_or(|p| p.proxy_url.is_none())
            && self.default_provider != "ollama"
        {
            warnings.push(format!(
                "No API key for default provider '{}' (set EXTFORGE_API_KEY or the vendor's key variable)",
                self.default_provider
            ));
        }

        let mut proxied: Vec<&String> = self
            .providers
            .iter()
            .filter(|(_, p)| p.proxy_url.is_some() && p.api_key.is_none())
            .map(|(name, _)| name)
            .collect();
        proxied.sort();
        if self.session_token.is_none() {
            for name in proxied {
                warnings.push(format!("Provider '{name}' uses a proxy but no session_token is set"));
            }
        }

        warnings
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            session_token: None,
            default_provider: default_provider(),
            default_model: default_model(),
            providers: HashMap::new(),
            agent: AgentSettings::default(),
            workspace: WorkspaceConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
