//! The agent orchestration loop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use extforge_config::AgentSettings;
use extforge_core::context::{FileMap, ToolExecutionContext};
use extforge_core::event::{DomainEvent, EventBus};
use extforge_core::message::{Conversation, Message};
use extforge_core::provider::{AiResponse, ProviderAdapter};
use extforge_core::tool::{ToolCall, ToolResult};
use extforge_core::{Error, Result};
use extforge_tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::optimizer::ToolCallOptimizer;
use crate::prompt::build_system_prompt;
use crate::result::AiServiceResult;

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Cancels whichever `chat()` is active on the loop it came from.
#[derive(Clone, Default)]
pub struct CancelHandle {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancelHandle {
    /// Request cancellation. Returns false when no turn is active.
    pub fn cancel(&self) -> bool {
        match self.active.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut guard) = self.active.lock() {
            *guard = Some(token.clone());
        }
        token
    }

    fn finish(&self) {
        if let Ok(mut guard) = self.active.lock() {
            *guard = None;
        }
    }
}

/// Drives one conversation: provider calls, tool batches, results.
pub struct AgentLoop {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    context: Arc<dyn ToolExecutionContext>,
    event_bus: Arc<EventBus>,
    max_iterations: u32,
    system_prompt_override: Option<String>,
    cancel: CancelHandle,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<ToolRegistry>,
        context: Arc<dyn ToolExecutionContext>,
    ) -> Self {
        Self {
            provider,
            tools,
            context,
            event_bus: Arc::new(EventBus::default()),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt_override: None,
            cancel: CancelHandle::default(),
        }
    }

    /// Apply iteration limit and prompt override from configuration.
    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        self.max_iterations = settings.max_iterations.max(1);
        self.system_prompt_override = settings.system_prompt_override.clone();
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt_override = Some(prompt.into());
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Cancel the active turn, if any.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// A handle that can cancel turns from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run one user turn to completion.
    ///
    /// Provider failures, tool failures and exhaustion are reported inside the
    /// returned result. Only cancellation ends the turn with `Err`.
    pub async fn chat(
        &self,
        conversation: &mut Conversation,
        user_message: &str,
    ) -> Result<AiServiceResult> {
        let token = self.cancel.begin();
        let outcome = self.run(conversation, user_message, &token).await;
        self.cancel.finish();

        if let Err(Error::Cancelled) = &outcome {
            info!(conversation_id = %conversation.id, "Turn cancelled");
        }
        outcome
    }

    async fn run(
        &self,
        conversation: &mut Conversation,
        user_message: &str,
        token: &CancellationToken,
    ) -> Result<AiServiceResult> {
        conversation.push(Message::user(user_message));

        info!(
            conversation_id = %conversation.id,
            provider = self.provider.name(),
            messages = conversation.len(),
            "Processing user turn"
        );

        let system_prompt = self.resolve_system_prompt().await;
        let tool_definitions = self.tools.definitions();
        let mut result = AiServiceResult::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut intro = String::new();

        for iteration in 1..=self.max_iterations {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            debug!(conversation_id = %conversation.id, iteration, "Agent loop iteration");

            let response = self
                .provider
                .chat(&conversation.messages, &tool_definitions, Some(&system_prompt))
                .await;
            result.iterations = iteration;

            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.event_bus.publish(DomainEvent::ResponseGenerated {
                conversation_id: conversation.id.to_string(),
                provider: self.provider.name().to_string(),
                iteration,
                timestamp: Utc::now(),
            });

            match response {
                AiResponse::Error { message, .. } => {
                    warn!(provider = self.provider.name(), error = %message, "Provider returned an error");
                    self.report_error("provider", &message);
                    result.errors.push(message.clone());
                    result.response = with_intro(
                        &intro,
                        &format!("Sorry, I ran into a problem talking to the AI provider: {message}"),
                    );
                    return Ok(result);
                }

                AiResponse::Text { content } => {
                    conversation.push(Message::assistant(content.clone()));
                    result.response = with_intro(&intro, &content);
                    info!(
                        conversation_id = %conversation.id,
                        iterations = result.iterations,
                        modified_files = result.modified_files.len(),
                        "Turn completed"
                    );
                    return Ok(result);
                }

                AiResponse::ToolCalls { tool_calls, .. } if tool_calls.is_empty() => {
                    let message = "Unexpected response from provider: tool call response without any tool calls";
                    warn!(provider = self.provider.name(), "{message}");
                    self.report_error("provider", message);
                    result.errors.push(message.to_string());
                    result.response = with_intro(
                        &intro,
                        "Sorry, the AI provider returned a response I could not use. Please try again.",
                    );
                    return Ok(result);
                }

                AiResponse::ToolCalls { content, tool_calls } => {
                    if iteration == 1 && !content.trim().is_empty() {
                        intro = content.trim().to_string();
                    }
                    self.run_batch(conversation, content, tool_calls, &mut seen, &mut result, token)
                        .await?;
                }
            }
        }

        warn!(
            conversation_id = %conversation.id,
            max_iterations = self.max_iterations,
            "Max tool iterations reached without a final answer"
        );
        let limit_error = format!(
            "Reached the maximum number of iterations ({}) without a final answer",
            self.max_iterations
        );
        self.report_error("agent_loop", &limit_error);
        result.errors.push(limit_error);
        result.response = with_intro(
            &intro,
            "[Stopped: reached the maximum number of tool iterations. Ask me to continue if the work is incomplete.]",
        );
        Ok(result)
    }

    /// Echo the calls, execute what the optimizer keeps and answer every call.
    async fn run_batch(
        &self,
        conversation: &mut Conversation,
        content: String,
        tool_calls: Vec<ToolCall>,
        seen: &mut HashSet<String>,
        result: &mut AiServiceResult,
        token: &CancellationToken,
    ) -> Result<()> {
        let files = self.current_files_for(&tool_calls).await;
        let partition = ToolCallOptimizer::partition(&tool_calls, seen, &files);

        debug!(
            requested = tool_calls.len(),
            executable = partition.executable.len(),
            skipped = partition.skipped_results.len(),
            "Executing tool batch"
        );

        conversation.push(Message::assistant_tool_calls(content, tool_calls.clone()));

        for call in &partition.executable {
            self.event_bus.publish(DomainEvent::ToolCallStarted {
                conversation_id: conversation.id.to_string(),
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: serde_json::Value::Object(call.arguments.clone()),
                timestamp: Utc::now(),
            });
        }

        if token.is_cancelled() {
            // Every echoed call still needs an answer
            for call in &tool_calls {
                conversation.push(Message::tool(ToolResult::failed(&call.id, &call.name, "Cancelled")));
            }
            return Err(Error::Cancelled);
        }

        let mut executed: Vec<ToolResult> = Vec::with_capacity(partition.executable.len());
        for call in &partition.executable {
            let started = Instant::now();
            let tool_result = self.tools.execute(call, self.context.as_ref()).await;

            self.event_bus.publish(DomainEvent::ToolExecuted {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                success: tool_result.success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            for path in &tool_result.modified_files {
                self.event_bus.publish(DomainEvent::FileChanged {
                    path: path.clone(),
                    timestamp: Utc::now(),
                });
            }
            executed.push(tool_result);
        }

        let ordered = merge_in_call_order(&tool_calls, executed, partition.skipped_results);
        for tool_result in &ordered {
            result.absorb(tool_result);
            conversation.push(Message::tool(tool_result.clone()));
        }
        result.tool_calls.extend(tool_calls);
        result.tool_results.extend(ordered);

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Files the optimizer needs; only fetched when a write is in the batch.
    async fn current_files_for(&self, calls: &[ToolCall]) -> FileMap {
        if !calls.iter().any(|c| c.name == "write_file") {
            return FileMap::new();
        }
        match self.context.get_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Could not read files for no-op detection");
                FileMap::new()
            }
        }
    }

    async fn resolve_system_prompt(&self) -> String {
        let files = match self.context.list_files(None).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Could not list workspace files for the system prompt");
                Vec::new()
            }
        };
        build_system_prompt(self.system_prompt_override.as_deref(), &files)
    }

    fn report_error(&self, context: &str, message: &str) {
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Results ordered like the calls that produced them.
fn merge_in_call_order(
    calls: &[ToolCall],
    executed: Vec<ToolResult>,
    skipped: Vec<ToolResult>,
) -> Vec<ToolResult> {
    let mut pool: Vec<Option<ToolResult>> = executed.into_iter().chain(skipped).map(Some).collect();
    calls
        .iter()
        .map(|call| {
            pool.iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|r| r.tool_call_id == call.id))
                .and_then(Option::take)
                .unwrap_or_else(|| ToolResult::failed(&call.id, &call.name, "No result produced"))
        })
        .collect()
}

fn with_intro(intro: &str, text: &str) -> String {
    if intro.is_empty() {
        text.to_string()
    } else if text.is_empty() {
        intro.to_string()
    } else {
        format!("{intro}\n\n{text}")
    }
}
