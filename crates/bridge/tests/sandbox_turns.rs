//! Agent turns whose tools run against a `SandboxContext` on the far side of
//! a channel transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extforge_agent::AgentLoop;
use extforge_bridge::protocol::BuildRequestPayload;
use extforge_bridge::{
    Bridge, BuildStatus, ChannelTransport, MessageType, ProtocolMessage, SandboxContext, Transport, TransportEnd,
    create_message, parse_message,
};
use extforge_config::SandboxConfig;
use extforge_core::context::ToolExecutionContext;
use extforge_core::error::ProviderError;
use extforge_core::message::Conversation;
use extforge_core::provider::{AiResponse, ChatRequest, ProviderAdapter};
use extforge_core::tool::ToolCall;
use serde_json::{Value, json};

// ── Helpers ──

struct ScriptedProvider {
    script: Mutex<VecDeque<AiResponse>>,
}

impl ScriptedProvider {
    fn new(script: Vec<AiResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, _request: ChatRequest) -> Result<AiResponse, ProviderError> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider ran out of responses"))
    }
}

#[derive(Clone, Copy)]
enum SandboxBehavior {
    /// Wait for our handshake and answer `ready`.
    AnswerHandshake,
    /// Send its own handshake first, after a short delay.
    InitiateHandshake,
}

/// Plays the sandbox: records what it receives and answers builds.
fn spawn_sandbox(end: TransportEnd, behavior: SandboxBehavior, build_reply: Value) -> Arc<Mutex<Vec<ProtocolMessage>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let record = received.clone();
    let TransportEnd { transport, mut inbound } = end;

    tokio::spawn(async move {
        if let SandboxBehavior::InitiateHandshake = behavior {
            tokio::time::sleep(Duration::from_millis(50)).await;
            transport
                .post(create_message(MessageType::Handshake, json!({"version": "1.0.0"})).to_value())
                .await
                .ok();
        }

        while let Some(raw) = inbound.recv().await {
            let Some(message) = parse_message(&raw) else { continue };
            record.lock().unwrap().push(message.clone());

            match message.message_type {
                MessageType::Handshake => {
                    let ready = create_message(MessageType::Ready, json!({"version": "1.0.0"}));
                    transport.post(ready.to_value()).await.ok();
                }
                MessageType::BuildRequest => {
                    let status = create_message(MessageType::Status, json!({"status": "building"}));
                    transport.post(status.to_value()).await.ok();
                    transport.post(build_reply.clone()).await.ok();
                }
                _ => {}
            }
        }
    });

    received
}

fn sandbox_context(behavior: SandboxBehavior, build_reply: Value) -> (Arc<SandboxContext>, Arc<Mutex<Vec<ProtocolMessage>>>) {
    let (host_end, sandbox_end) = ChannelTransport::pair();
    let received = spawn_sandbox(sandbox_end, behavior, build_reply);
    let bridge = Bridge::new(Arc::new(host_end.transport));
    bridge.listen(host_end.inbound);
    (Arc::new(SandboxContext::new(bridge, &SandboxConfig::default())), received)
}

fn build_complete(preview_url: &str) -> Value {
    create_message(
        MessageType::BuildComplete,
        json!({"preview_url": preview_url, "duration_ms": 1500}),
    )
    .to_value()
}

fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::from_value(id, name, args)
}

fn tool_calls(calls: Vec<ToolCall>) -> AiResponse {
    AiResponse::ToolCalls {
        content: String::new(),
        tool_calls: calls,
    }
}

fn text(content: &str) -> AiResponse {
    AiResponse::Text { content: content.into() }
}

fn edit_then_build_script() -> Vec<AiResponse> {
    vec![
        tool_calls(vec![
            call("w1", "write_file", json!({"file_path": "manifest.json", "content": "{\"manifest_version\":3}"})),
            call("w2", "write_file", json!({"file_path": "popup.js", "content": "console.log('hi')"})),
        ]),
        tool_calls(vec![call("b1", "build", json!({"install_deps": true}))]),
        text("Built and running."),
    ]
}

fn message_types(received: &Mutex<Vec<ProtocolMessage>>) -> Vec<MessageType> {
    received.lock().unwrap().iter().map(|m| m.message_type).collect()
}

// ── Scenarios ──

#[tokio::test]
async fn build_complete_surfaces_preview_in_turn_result() {
    let (ctx, received) = sandbox_context(SandboxBehavior::AnswerHandshake, build_complete("blob:preview/42"));
    ctx.connect().await.unwrap();

    let agent = AgentLoop::new(
        ScriptedProvider::new(edit_then_build_script()),
        Arc::new(extforge_tools::default_registry()),
        ctx.clone(),
    );
    let mut conv = Conversation::new();
    let result = agent.chat(&mut conv, "Make a popup and run it").await.unwrap();

    assert!(result.build_triggered);
    assert_eq!(result.preview_url.as_deref(), Some("blob:preview/42"));
    assert_eq!(result.modified_files, vec!["manifest.json", "popup.js"]);
    assert!(result.errors.is_empty());
    assert_eq!(result.response, "Built and running.");

    assert_eq!(
        message_types(&received),
        vec![
            MessageType::Handshake,
            MessageType::FileUpdate,
            MessageType::FileUpdate,
            MessageType::BuildRequest,
        ]
    );
    let request: BuildRequestPayload = received.lock().unwrap()[3].payload_as().unwrap();
    assert!(request.install_deps);
    assert_eq!(request.files.len(), 2);
    assert_eq!(request.files["popup.js"], "console.log('hi')");

    assert_eq!(ctx.status(), BuildStatus::Running);
    assert!(ctx.is_running().await);
}

#[tokio::test]
async fn work_before_handshake_is_delivered_in_order() {
    let (ctx, received) = sandbox_context(SandboxBehavior::InitiateHandshake, build_complete("blob:preview/7"));

    let agent = AgentLoop::new(
        ScriptedProvider::new(edit_then_build_script()),
        Arc::new(extforge_tools::default_registry()),
        ctx.clone(),
    );
    let mut conv = Conversation::new();
    let result = agent.chat(&mut conv, "Make a popup and run it").await.unwrap();

    assert!(ctx.bridge().is_connected());
    assert!(result.build_triggered);
    assert_eq!(result.preview_url.as_deref(), Some("blob:preview/7"));
    assert_eq!(
        message_types(&received),
        vec![
            MessageType::Ready,
            MessageType::FileUpdate,
            MessageType::FileUpdate,
            MessageType::BuildRequest,
        ]
    );
}

#[tokio::test]
async fn build_error_is_reported_and_turn_continues() {
    let failure = create_message(
        MessageType::BuildError,
        json!({"error": "Unexpected token in popup.js", "details": "line 1"}),
    )
    .to_value();
    let (ctx, _received) = sandbox_context(SandboxBehavior::AnswerHandshake, failure);
    ctx.connect().await.unwrap();

    let agent = AgentLoop::new(
        ScriptedProvider::new(vec![
            tool_calls(vec![call("b1", "build", json!({}))]),
            tool_calls(vec![call("l1", "get_logs", json!({}))]),
            text("The build failed on popup.js."),
        ]),
        Arc::new(extforge_tools::default_registry()),
        ctx.clone(),
    );
    let mut conv = Conversation::new();
    let result = agent.chat(&mut conv, "Build it").await.unwrap();

    assert!(!result.build_triggered);
    assert!(result.preview_url.is_none());
    assert!(!result.tool_results[0].success);
    assert!(result.errors[0].contains("Unexpected token in popup.js"));
    assert!(result.tool_results[1].content.contains("[build] Unexpected token in popup.js"));
    assert_eq!(ctx.status(), BuildStatus::Error);
    assert_eq!(result.response, "The build failed on popup.js.");
}
