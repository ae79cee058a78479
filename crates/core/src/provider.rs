//! Provider adapter trait: the abstraction over AI vendors.
//!
//! An adapter converts the canonical conversation into one vendor's wire
//! shape, performs the network call, and normalizes the answer into an
//! [`AiResponse`]. Adapters never fail past their boundary: `chat()` folds
//! every transport or vendor error into [`AiResponse::Error`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCall;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One request to a provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the model can call
    pub tools: Vec<ToolDefinition>,

    /// System prompt, sent the way the vendor expects
    pub system_prompt: Option<String>,
}

/// The normalized answer of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AiResponse {
    /// A final answer.
    Text { content: String },

    /// The model wants tools run. `content` is free "intro" text, possibly empty.
    ToolCalls {
        content: String,
        tool_calls: Vec<ToolCall>,
    },

    /// The call failed. `raw` carries the vendor payload for diagnostics.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<serde_json::Value>,
    },
}

impl AiResponse {
    /// Build a response from free text and parsed calls: calls win over text.
    pub fn from_parts(content: String, tool_calls: Vec<ToolCall>) -> Self {
        if tool_calls.is_empty() {
            AiResponse::Text { content }
        } else {
            AiResponse::ToolCalls { content, tool_calls }
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        AiResponse::Error {
            message: message.into(),
            raw: None,
        }
    }
}

impl From<ProviderError> for AiResponse {
    fn from(err: ProviderError) -> Self {
        AiResponse::Error {
            message: err.to_string(),
            raw: err.raw(),
        }
    }
}

/// The provider adapter trait.
///
/// The agent loop calls `chat()` without knowing which vendor is behind it.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// A human-readable name for this adapter (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Whether the adapter holds what it needs to attempt a call.
    fn is_configured(&self) -> bool;

    /// Perform the vendor call.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<AiResponse, ProviderError>;

    /// Send the conversation and normalize the outcome. Never fails.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system_prompt: Option<&str>,
    ) -> AiResponse {
        if !self.is_configured() {
            return ProviderError::NotConfigured(format!(
                "'{}' has no API key or proxy configured",
                self.name()
            ))
            .into();
        }

        let request = ChatRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            system_prompt: system_prompt.map(str::to_string),
        };

        match self.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(provider = %self.name(), error = %e, "Provider call failed");
                e.into()
            }
        }
    }
}
