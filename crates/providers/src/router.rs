//! Provider router: selects the adapter for the configured vendor.
//!
//! Every known adapter is built once from configuration and looked up by
//! name afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use extforge_config::AppConfig;
use extforge_core::provider::ProviderAdapter;
use tracing::debug;

use crate::anthropic::AnthropicAdapter;
use crate::gemini::GeminiAdapter;
use crate::openai_compat::OpenAiCompatAdapter;

/// Vendors `build_from_config` always registers.
pub const KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "gemini",
    "openrouter",
    "groq",
    "deepseek",
    "together",
    "kimi",
    "ollama",
];

/// Routes requests to the correct adapter.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ProviderAdapter>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default adapter.
    pub fn default(&self) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).cloned()
    }

    /// All registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build every adapter from configuration.
///
/// A vendor gets its own key, or the global key when it is the default
/// provider. OpenAI-compatible vendors without a key fall back to their
/// configured proxy. Unknown names in `[providers]` are treated as
/// OpenAI-compatible endpoints at their `api_url`.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    let mut names: Vec<String> = KNOWN_PROVIDERS.iter().map(|s| s.to_string()).collect();
    for name in config.providers.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    if !names.contains(&config.default_provider) {
        names.push(config.default_provider.clone());
    }

    for name in names {
        let adapter = build_adapter(config, &name);
        debug!(provider = %name, configured = adapter.is_configured(), "Registered provider");
        router.register(name, adapter);
    }

    router
}

fn build_adapter(config: &AppConfig, name: &str) -> Arc<dyn ProviderAdapter> {
    let provider_config = config.providers.get(name).cloned().unwrap_or_default();
    let is_default = name == config.default_provider;

    let api_key = provider_config
        .api_key
        .clone()
        .or_else(|| if is_default { config.api_key.clone() } else { None });

    let model = provider_config
        .default_model
        .clone()
        .or_else(|| is_default.then(|| config.default_model.clone()));

    let settings = &config.agent;

    match name {
        "anthropic" => {
            let mut adapter = AnthropicAdapter::new(api_key)
                .with_temperature(settings.temperature)
                .with_max_tokens(settings.max_tokens);
            if let Some(url) = provider_config.api_url {
                adapter = adapter.with_base_url(url);
            }
            if let Some(model) = model {
                adapter = adapter.with_model(model);
            }
            Arc::new(adapter)
        }
        "gemini" => {
            let mut adapter = GeminiAdapter::new(api_key)
                .with_temperature(settings.temperature)
                .with_max_tokens(settings.max_tokens);
            if let Some(url) = provider_config.api_url {
                adapter = adapter.with_base_url(url);
            }
            if let Some(model) = model {
                adapter = adapter.with_model(model);
            }
            Arc::new(adapter)
        }
        _ => {
            let mut adapter = OpenAiCompatAdapter::for_vendor(name).unwrap_or_else(|| {
                OpenAiCompatAdapter::new(name, default_base_url(name))
            });
            adapter = adapter
                .with_temperature(settings.temperature)
                .with_max_tokens(settings.max_tokens);
            if let Some(url) = provider_config.api_url {
                adapter = adapter.with_base_url(url);
            }
            if let Some(key) = api_key {
                adapter = adapter.with_api_key(key);
            }
            if let Some(proxy) = provider_config.proxy_url {
                adapter = adapter.with_proxy(proxy, config.session_token.clone());
            }
            if let Some(model) = model {
                adapter = adapter.with_model(model);
            }
            Arc::new(adapter)
        }
    }
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "anthropic" => "https://api.anthropic.com".into(),
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "kimi" | "moonshot" => "https://api.moonshot.ai/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "http://localhost:8080/v1".into(),
    }
}
