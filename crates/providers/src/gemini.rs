//! Google Gemini adapter (`generateContent`).
//!
//! Gemini names tool calls but never identifies them, so ids are generated
//! here. A tool result is answered with a `functionResponse` part carrying the
//! function name, which is taken from the `ToolResult`.

use async_trait::async_trait;
use extforge_core::error::ProviderError;
use extforge_core::message::{Message, Role};
use extforge_core::provider::{AiResponse, ChatRequest, ProviderAdapter, ToolDefinition};
use extforge_core::tool::ToolCall;
use serde_json::{Value, json};
use tracing::debug;

use crate::http;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct GeminiAdapter {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: "gemini-2.0-flash".into(),
            temperature: 0.7,
            max_tokens: 4096,
            client: http::client(REQUEST_TIMEOUT_SECS),
        }
    }

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

    /// Convert messages to Gemini `contents`.
    ///
    /// Roles are `user` and `model`; function responses travel in user turns
    /// and consecutive ones share a turn.
    fn to_contents(messages: &[Message]) -> Vec<Value> {
        let mut contents: Vec<Value> = Vec::new();
        let mut pending_responses: Vec<Value> = Vec::new();

        let flush = |contents: &mut Vec<Value>, pending: &mut Vec<Value>| {
            if !pending.is_empty() {
                contents.push(json!({ "role": "user", "parts": std::mem::take(pending) }));
            }
        };

        for msg in messages {
            match msg.role {
                Role::Tool => {
                    let name = msg
                        .tool_result
                        .as_ref()
                        .map(|r| r.name.clone())
                        .unwrap_or_default();
                    pending_responses.push(json!({
                        "functionResponse": {
                            "name": name,
                            "response": { "content": msg.text() }
                        }
                    }));
                }
                Role::User => {
                    flush(&mut contents, &mut pending_responses);
                    contents.push(json!({ "role": "user", "parts": [{ "text": msg.text() }] }));
                }
                Role::Assistant => {
                    flush(&mut contents, &mut pending_responses);
                    let mut parts = Vec::new();
                    if !msg.text().is_empty() {
                        parts.push(json!({ "text": msg.text() }));
                    }
                    parts.extend(msg.tool_calls.iter().map(|tc| {
                        json!({ "functionCall": { "name": tc.name, "args": tc.arguments } })
                    }));
                    if !parts.is_empty() {
                        contents.push(json!({ "role": "model", "parts": parts }));
                    }
                }
                Role::System => {} // systemInstruction
            }
        }
        flush(&mut contents, &mut pending_responses);

        contents
    }

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
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    fn to_tools(tools: &[ToolDefinition]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        json!([{ "functionDeclarations": declarations }])
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "contents": Self::to_contents(&request.messages),
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });

        if let Some(system) = Self::system_text(request.system_prompt.as_deref(), &request.messages) {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        if !request.tools.is_empty() {
            body["tools"] = Self::to_tools(&request.tools);
        }

        body
    }

    fn parse_response(body: Value) -> Result<AiResponse, ProviderError> {
        let Some(parts) = body
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
        else {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .map(|r| format!("Gemini blocked the prompt: {r}"))
                .unwrap_or_else(|| "No candidates in Gemini response".into());
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: reason,
                raw: Some(body),
            });
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                let args = call.get("args").cloned().unwrap_or(Value::Null);
                tool_calls.push(ToolCall::from_value(ToolCall::generate_id(), name, args));
            }
        }

        Ok(AiResponse::from_parts(text, tool_calls))
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: ChatRequest) -> Result<AiResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("'gemini' has no API key".into()))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.request_body(&request);

        debug!(provider = "gemini", model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        if response.status().as_u16() == 404 {
            return Err(ProviderError::ModelNotFound(self.model.clone()));
        }

        let json = http::read_json(response, "Gemini").await?;
        Self::parse_response(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extforge_core::tool::ToolResult;

    #[test]
    fn roles_map_to_user_and_model() {
        let messages = vec![Message::user("Hi"), Message::assistant("Hello")];
        let contents = GeminiAdapter::to_contents(&messages);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Hello");
    }

    #[test]
    fn function_calls_and_responses() {
        let mut args = serde_json::Map::new();
        args.insert("file_path".into(), "popup.html".into());
        let messages = vec![
            Message::user("Read popup"),
            Message::assistant_tool_calls(
                "",
                vec![
                    ToolCall::new("g1", "read_file", args.clone()),
                    ToolCall::new("g2", "read_file", args),
                ],
            ),
            Message::tool(ToolResult::ok("g1", "read_file", "<html>")),
            Message::tool(ToolResult::ok("g2", "read_file", "<html>")),
        ];
        let contents = GeminiAdapter::to_contents(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "read_file");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"]["file_path"], "popup.html");

        let responses = contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["functionResponse"]["name"], "read_file");
        assert_eq!(responses[0]["functionResponse"]["response"]["content"], "<html>");
    }

    #[test]
    fn system_instruction_is_separate() {
        let adapter = GeminiAdapter::new(Some("key".into()));
        let request = ChatRequest {
            messages: vec![Message::system("Extra"), Message::user("Hi")],
            tools: vec![],
            system_prompt: Some("Base".into()),
        };
        let body = adapter.request_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Base\n\nExtra");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tool_declarations_are_grouped() {
        let tools = vec![ToolDefinition {
            name: "get_logs".into(),
            description: "Logs".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let value = GeminiAdapter::to_tools(&tools);
        assert_eq!(value[0]["functionDeclarations"][0]["name"], "get_logs");
    }

    #[test]
    fn parsed_calls_get_generated_ids() {
        let body = json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "Checking logs."},
                {"functionCall": {"name": "get_logs", "args": {}}},
                {"functionCall": {"name": "get_logs", "args": {}}}
            ]}}]
        });
        match GeminiAdapter::parse_response(body).unwrap() {
            AiResponse::ToolCalls { content, tool_calls } => {
                assert_eq!(content, "Checking logs.");
                assert_eq!(tool_calls.len(), 2);
                assert!(tool_calls[0].id.starts_with("call_"));
                assert_ne!(tool_calls[0].id, tool_calls[1].id);
            }
            other => panic!("Expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiAdapter::parse_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
