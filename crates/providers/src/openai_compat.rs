//! OpenAI-compatible adapter.
//!
//! Works with: OpenAI, OpenRouter, Groq, DeepSeek, Together AI, Kimi
//! (Moonshot), Ollama, and any endpoint exposing `/chat/completions`.
//!
//! When no API key is held but a trusted proxy is configured, requests go to
//! the proxy authenticated with the session token instead. Callers see the
//! same contract either way.

use async_trait::async_trait;
use extforge_core::error::ProviderError;
use extforge_core::provider::{AiResponse, ChatRequest, ProviderAdapter};
use tracing::debug;

use crate::{http, openai_wire};

const REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Where one request goes and what authenticates it.
#[derive(Debug, PartialEq)]
struct Endpoint {
    url: String,
    bearer: Option<String>,
    via_proxy: bool,
}

/// An adapter for any OpenAI-compatible vendor.
pub struct OpenAiCompatAdapter {
    name: String,
    base_url: String,
    api_key: Option<String>,
    proxy_url: Option<String>,
    session_token: Option<String>,
    requires_key: bool,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    /// Create an adapter for a named vendor at `base_url`.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            proxy_url: None,
            session_token: None,
            requires_key: true,
            model: "gpt-4o".into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            client: http::client(REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn openai() -> Self {
        Self::new("openai", "https://api.openai.com/v1").with_model("gpt-4o")
    }

    pub fn openrouter() -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1").with_model("openai/gpt-4o")
    }

    pub fn groq() -> Self {
        Self::new("groq", "https://api.groq.com/openai/v1").with_model("llama-3.3-70b-versatile")
    }

    pub fn deepseek() -> Self {
        Self::new("deepseek", "https://api.deepseek.com/v1").with_model("deepseek-chat")
    }

    pub fn together() -> Self {
        Self::new("together", "https://api.together.xyz/v1")
            .with_model("meta-llama/Llama-3.3-70B-Instruct-Turbo")
    }

    pub fn kimi() -> Self {
        Self::new("kimi", "https://api.moonshot.ai/v1").with_model("moonshot-v1-32k")
    }

    /// Local Ollama server; no key needed.
    pub fn ollama(base_url: Option<&str>) -> Self {
        let mut adapter = Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"))
            .with_model("llama3.2");
        adapter.requires_key = false;
        adapter
    }

    /// Named constructor lookup for the vendors above.
    pub fn for_vendor(name: &str) -> Option<Self> {
        match name {
            "openai" => Some(Self::openai()),
            "openrouter" => Some(Self::openrouter()),
            "groq" => Some(Self::groq()),
            "deepseek" => Some(Self::deepseek()),
            "together" => Some(Self::together()),
            "kimi" | "moonshot" => Some(Self::kimi()),
            "ollama" => Some(Self::ollama(None)),
            _ => None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Route keyless requests through a trusted proxy using `session_token`.
    pub fn with_proxy(mut self, proxy_url: impl Into<String>, session_token: Option<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self.session_token = session_token;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> Option<Endpoint> {
        if let Some(key) = &self.api_key {
            return Some(Endpoint {
                url: format!("{}/chat/completions", self.base_url),
                bearer: Some(key.clone()),
                via_proxy: false,
            });
        }
        if let Some(proxy) = &self.proxy_url {
            return Some(Endpoint {
                url: proxy.clone(),
                bearer: self.session_token.clone(),
                via_proxy: true,
            });
        }
        if !self.requires_key {
            return Some(Endpoint {
                url: format!("{}/chat/completions", self.base_url),
                bearer: None,
                via_proxy: false,
            });
        }
        None
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.endpoint().is_some()
    }

    async fn complete(&self, request: ChatRequest) -> Result<AiResponse, ProviderError> {
        let endpoint = self.endpoint().ok_or_else(|| {
            ProviderError::NotConfigured(format!("'{}' has no API key or proxy configured", self.name))
        })?;

        let body = openai_wire::request_body(&self.model, &request, self.temperature, self.max_tokens);

        debug!(
            vendor = %self.name,
            model = %self.model,
            via_proxy = endpoint.via_proxy,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );

        let mut builder = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json");
        if let Some(bearer) = &endpoint.bearer {
            builder = builder.header("Authorization", format!("Bearer {bearer}"));
        }
        if endpoint.via_proxy {
            builder = builder.header("X-Extforge-Provider", &self.name);
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let json = http::read_json(response, &self.name).await?;
        openai_wire::parse_response(json)
    }
}
