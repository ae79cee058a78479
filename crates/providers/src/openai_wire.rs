//! OpenAI chat-completions wire format.
//!
//! Shared by every vendor exposing an OpenAI-compatible
//! `/chat/completions` endpoint. These are plain conversion functions so any
//! adapter can compose them without inheriting another adapter's behaviour.

use extforge_core::error::ProviderError;
use extforge_core::message::{Message, Role};
use extforge_core::provider::{AiResponse, ChatRequest, ToolDefinition};
use extforge_core::tool::ToolCall;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Convert the conversation to OpenAI messages, system prompt first.
pub fn to_api_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<ApiMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        out.push(ApiMessage {
            role: "system".into(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    out.extend(messages.iter().map(|m| ApiMessage {
        role: match m.role {
            Role::User => "user".into(),
            Role::Assistant => "assistant".into(),
            Role::System => "system".into(),
            Role::Tool => "tool".into(),
        },
        content: m.content.clone(),
        tool_calls: if m.tool_calls.is_empty() {
            None
        } else {
            Some(
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: serde_json::Value::Object(tc.arguments.clone()).to_string(),
                        },
                    })
                    .collect(),
            )
        },
        tool_call_id: m.tool_call_id().map(str::to_string),
    }));

    out
}

/// Convert tool definitions to OpenAI function declarations.
pub fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

/// Build a chat-completions request body.
pub fn request_body(
    model: &str,
    request: &ChatRequest,
    temperature: f32,
    max_tokens: Option<u32>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": to_api_messages(&request.messages, request.system_prompt.as_deref()),
        "temperature": temperature,
        "stream": false,
    });

    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }

    if !request.tools.is_empty() {
        body["tools"] = serde_json::json!(to_api_tools(&request.tools));
    }

    body
}

/// Parse a string-encoded arguments object.
///
/// Malformed JSON yields an empty object so the call still reaches the tool,
/// which then reports its missing arguments to the model.
pub fn parse_arguments(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            warn!(arguments = %other, "Tool arguments are not an object, using empty arguments");
            serde_json::Map::new()
        }
        Err(e) => {
            warn!(error = %e, arguments = %raw, "Malformed tool arguments, using empty arguments");
            serde_json::Map::new()
        }
    }
}

/// Normalize a chat-completions response body.
pub fn parse_response(body: serde_json::Value) -> Result<AiResponse, ProviderError> {
    let api_response: ApiResponse =
        serde_json::from_value(body.clone()).map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
            raw: Some(body.clone()),
        })?;

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
            raw: Some(body),
        })?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let id = if tc.id.is_empty() { ToolCall::generate_id() } else { tc.id };
            ToolCall::new(id, tc.function.name, parse_arguments(&tc.function.arguments))
        })
        .collect();

    Ok(AiResponse::from_parts(
        choice.message.content.unwrap_or_default(),
        tool_calls,
    ))
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolDefinition {
    pub r#type: String,
    pub function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
