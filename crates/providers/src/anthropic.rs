//! Anthropic native adapter.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks

use async_trait::async_trait;
use extforge_core::error::ProviderError;
use extforge_core::message::{Message, Role};
use extforge_core::provider::{AiResponse, ChatRequest, ProviderAdapter, ToolDefinition};
use extforge_core::tool::ToolCall;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Anthropic Messages API adapter.
pub struct AnthropicAdapter {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: "claude-sonnet-4-20250514".into(),
            temperature: 0.7,
            max_tokens: DEFAULT_MAX_TOKENS,
            client: http::client(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
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
        self.max_tokens = max_tokens;
        self
    }

    /// Join the configured prompt and any system messages into the top-level field.
    fn system_text(system_prompt: Option<&str>, messages: &[Message]) -> Option<String> {
        let parts: Vec<&str> = system_prompt
            .into_iter()
            .chain(
                messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.text()),
            )
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Convert messages to Anthropic content blocks.
    ///
    /// Tool results become user turns; consecutive results share one turn
    /// because the API rejects back-to-back user messages.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(msg.text().to_string()),
                }),
                Role::Assistant if msg.tool_calls.is_empty() => result.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Text(msg.text().to_string()),
                }),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.text().is_empty() {
                        blocks.push(ContentBlock::Text { text: msg.text().to_string() });
                    }
                    blocks.extend(msg.tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: serde_json::Value::Object(tc.arguments.clone()),
                    }));
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id().unwrap_or_default().to_string(),
                        content: msg.text().to_string(),
                        is_error: msg.tool_result.as_ref().is_some_and(|r| !r.success),
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage { role, content: AnthropicContent::Blocks(blocks) })
                            if *role == "user"
                                && blocks.iter().all(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
                        {
                            blocks.push(block);
                        }
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
                Role::System => {} // top-level field
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        if let Some(system) = Self::system_text(request.system_prompt.as_deref(), &request.messages) {
            body["system"] = serde_json::json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn parse_response(body: serde_json::Value) -> Result<AiResponse, ProviderError> {
        let resp: AnthropicResponse =
            serde_json::from_value(body.clone()).map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
                raw: Some(body),
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::from_value(id, name, input));
                }
                ResponseContentBlock::Other => {}
            }
        }

        Ok(AiResponse::from_parts(text, tool_calls))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: ChatRequest) -> Result<AiResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("'anthropic' has no API key".into()))?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&request);

        debug!(provider = "anthropic", model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let json = http::read_json(response, "Anthropic").await?;
        Self::parse_response(json)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use extforge_core::tool::ToolResult;

    fn write_call(id: &str) -> ToolCall {
        let mut args = serde_json::Map::new();
        args.insert("file_path".into(), "manifest.json".into());
        args.insert("content".into(), "{}".into());
        ToolCall::new(id, "write_file", args)
    }

    #[test]
    fn system_prompt_and_messages_are_joined() {
        let messages = vec![Message::system("Be terse."), Message::user("Hi")];
        let system = AnthropicAdapter::system_text(Some("You build extensions."), &messages);
        assert_eq!(system.as_deref(), Some("You build extensions.\n\nBe terse."));

        let api = AnthropicAdapter::to_api_messages(&messages);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].role, "user");
    }

    #[test]
    fn no_system_text_when_empty() {
        assert!(AnthropicAdapter::system_text(None, &[Message::user("Hi")]).is_none());
    }

    #[test]
    fn tool_use_blocks_carry_object_input() {
        let msg = Message::assistant_tool_calls("Writing the manifest.", vec![write_call("toolu_1")]);
        let api = AnthropicAdapter::to_api_messages(&[msg]);
        let json = serde_json::to_value(&api[0]).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "tool_use");
        assert_eq!(json["content"][1]["input"]["file_path"], "manifest.json");
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_turn() {
        let messages = vec![
            Message::user("Write two files"),
            Message::assistant_tool_calls("", vec![write_call("a"), write_call("b")]),
            Message::tool(ToolResult::ok("a", "write_file", "ok")),
            Message::tool(ToolResult::failed("b", "write_file", "disk full")),
        ];
        let api = AnthropicAdapter::to_api_messages(&messages);
        assert_eq!(api.len(), 3);

        let json = serde_json::to_value(&api[2]).unwrap();
        assert_eq!(json["role"], "user");
        let blocks = json["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["tool_use_id"], "a");
        assert!(blocks[0].get("is_error").is_none());
        assert_eq!(blocks[1]["is_error"], true);
    }

    #[test]
    fn request_body_has_top_level_system() {
        let adapter = AnthropicAdapter::new(Some("sk-ant".into())).with_model("claude-test");
        let request = ChatRequest {
            messages: vec![Message::user("Hi")],
            tools: vec![ToolDefinition {
                name: "build".into(),
                description: "Build".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            system_prompt: Some("System".into()),
        };
        let body = adapter.request_body(&request);
        assert_eq!(body["system"], "System");
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn parse_tool_use_response() {
        let body = serde_json::json!({
            "id": "msg_1",
            "model": "claude",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Building now."},
                {"type": "tool_use", "id": "toolu_9", "name": "build", "input": {"install_deps": true}}
            ],
            "stop_reason": "tool_use"
        });
        match AnthropicAdapter::parse_response(body).unwrap() {
            AiResponse::ToolCalls { content, tool_calls } => {
                assert_eq!(content, "Building now.");
                assert_eq!(tool_calls[0].id, "toolu_9");
                assert_eq!(tool_calls[0].arguments["install_deps"], true);
            }
            other => panic!("Expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn parse_text_response() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "Done."}]
        });
        assert_eq!(
            AnthropicAdapter::parse_response(body).unwrap(),
            AiResponse::Text { content: "Done.".into() }
        );
    }

    #[test]
    fn keyless_adapter_is_not_configured() {
        assert!(!AnthropicAdapter::new(None).is_configured());
        assert!(!AnthropicAdapter::new(Some(String::new())).is_configured());
        assert!(AnthropicAdapter::new(Some("k".into())).is_configured());
    }
}
