//! `SandboxContext`: tool execution against a sandboxed build/preview.
//!
//! Files live in memory on the host side and are mirrored to the sandbox with
//! `file_update` messages. Builds, stops and terminal input go exclusively
//! through the [`Bridge`]; logs and status come back the same way.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use extforge_config::SandboxConfig;
use extforge_core::context::{BuildOutcome, CommandOutput, FileMap, ToolExecutionContext};
use extforge_core::error::{BridgeError, ToolError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, Subscription};
use crate::protocol::{
    BuildCompletePayload, BuildErrorPayload, BuildProgressPayload, BuildRequestPayload, ErrorPayload,
    FileUpdatePayload, LogPayload, MessageType, PreviewUrlPayload, StatusPayload, TerminalPayload, create_message,
};
use crate::status::BuildStatus;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded log buffer shared with the bridge handlers.
struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl LogBuffer {
    fn push(&self, line: String) {
        let mut lines = lock(&self.lines);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

/// State the sandbox reports back to us.
#[derive(Default)]
struct Observed {
    status: BuildStatus,
    preview_url: Option<String>,
}

type BuildReply = Result<BuildCompletePayload, BuildErrorPayload>;

pub struct SandboxContext {
    bridge: Bridge,
    files: Mutex<FileMap>,
    logs: Arc<LogBuffer>,
    observed: Arc<Mutex<Observed>>,
    build_timeout: Duration,
    handshake_timeout: Duration,
    subscriptions: Vec<Subscription>,
}

impl SandboxContext {
    pub fn new(bridge: Bridge, config: &SandboxConfig) -> Self {
        let logs = Arc::new(LogBuffer {
            lines: Mutex::new(VecDeque::new()),
            capacity: config.log_capacity.max(1),
        });
        let observed = Arc::new(Mutex::new(Observed::default()));
        let subscriptions = Self::subscribe(&bridge, &logs, &observed);

        Self {
            bridge,
            files: Mutex::new(FileMap::new()),
            logs,
            observed,
            build_timeout: Duration::from_secs(config.build_timeout_secs),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
            subscriptions,
        }
    }

    fn subscribe(bridge: &Bridge, logs: &Arc<LogBuffer>, observed: &Arc<Mutex<Observed>>) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();

        let sink = logs.clone();
        subscriptions.push(bridge.on(MessageType::Log, move |message| {
            if let Some(log) = message.payload_as::<LogPayload>() {
                let level = serde_json::to_value(log.level)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                match log.source {
                    Some(source) => sink.push(format!("[{level}] [{source}] {}", log.message)),
                    None => sink.push(format!("[{level}] {}", log.message)),
                }
            }
        }));

        let sink = logs.clone();
        subscriptions.push(bridge.on(MessageType::TerminalOutput, move |message| {
            if let Some(output) = message.payload_as::<TerminalPayload>() {
                for line in output.data.lines() {
                    sink.push(format!("[terminal] {line}"));
                }
            }
        }));

        let sink = logs.clone();
        subscriptions.push(bridge.on(MessageType::Error, move |message| {
            if let Some(error) = message.payload_as::<ErrorPayload>() {
                warn!(error = %error.message, "Sandbox reported an error");
                sink.push(format!("[error] {}", error.message));
            }
        }));

        let state = observed.clone();
        subscriptions.push(bridge.on(MessageType::Status, move |message| {
            if let Some(status) = message.payload_as::<StatusPayload>() {
                debug!(status = %status.status, "Sandbox status");
                lock(&state).status = status.status;
            }
        }));

        let state = observed.clone();
        subscriptions.push(bridge.on(MessageType::BuildProgress, move |message| {
            if let Some(progress) = message.payload_as::<BuildProgressPayload>() {
                lock(&state).status = progress.stage;
            }
        }));

        let state = observed.clone();
        subscriptions.push(bridge.on(MessageType::PreviewUrl, move |message| {
            if let Some(preview) = message.payload_as::<PreviewUrlPayload>() {
                lock(&state).preview_url = Some(preview.url);
            }
        }));

        let state = observed.clone();
        subscriptions.push(bridge.on(MessageType::StopExtensionAck, move |_| {
            lock(&state).status = BuildStatus::Idle;
        }));

        subscriptions
    }

    /// Handshake with the sandbox and wait for it to answer.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        self.bridge.connect().await?;
        self.bridge.wait_connected(self.handshake_timeout).await
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn status(&self) -> BuildStatus {
        lock(&self.observed).status
    }

    pub fn preview_url(&self) -> Option<String> {
        lock(&self.observed).preview_url.clone()
    }

    async fn mirror(&self, path: &str, content: Option<String>) {
        let update = FileUpdatePayload {
            path: path.to_string(),
            content,
        };
        if let Err(e) = self.bridge.send(MessageType::FileUpdate, update).await {
            // The next build carries the full file map anyway
            warn!(path, error = %e, "Could not mirror file to the sandbox");
        }
    }

    /// Wait for the first `build_complete` or `build_error` after a request.
    fn await_build_reply(&self) -> (oneshot::Receiver<BuildReply>, [Subscription; 2]) {
        let (tx, rx) = oneshot::channel::<BuildReply>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let slot = tx.clone();
        let on_complete = self.bridge.on(MessageType::BuildComplete, move |message| {
            let payload = message.payload_as::<BuildCompletePayload>().unwrap_or_default();
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(Ok(payload));
            }
        });

        let slot = tx;
        let on_error = self.bridge.on(MessageType::BuildError, move |message| {
            let payload = message.payload_as::<BuildErrorPayload>().unwrap_or(BuildErrorPayload {
                error: "Build failed".into(),
                details: None,
            });
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(Err(payload));
            }
        });

        (rx, [on_complete, on_error])
    }

    fn set_status(&self, status: BuildStatus) {
        lock(&self.observed).status = status;
    }
}

impl Drop for SandboxContext {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

#[async_trait]
impl ToolExecutionContext for SandboxContext {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), ToolError> {
        lock(&self.files).insert(path.to_string(), content.to_string());
        self.mirror(path, Some(content.to_string())).await;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, ToolError> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| ToolError::FileNotFound(path.to_string()))
    }

    async fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        if lock(&self.files).remove(path).is_none() {
            return Err(ToolError::FileNotFound(path.to_string()));
        }
        self.mirror(path, None).await;
        Ok(())
    }

    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, ToolError> {
        let prefix = directory
            .map(|d| d.trim_matches('/'))
            .filter(|d| !d.is_empty() && *d != ".")
            .map(|d| format!("{d}/"));
        let mut paths: Vec<String> = lock(&self.files)
            .keys()
            .filter(|p| prefix.as_ref().is_none_or(|prefix| p.starts_with(prefix.as_str())))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn get_files(&self) -> Result<FileMap, ToolError> {
        Ok(lock(&self.files).clone())
    }

    async fn set_files(&self, files: FileMap) -> Result<(), ToolError> {
        *lock(&self.files) = files;
        Ok(())
    }

    async fn build(&self, files: FileMap, install_deps: bool) -> Result<BuildOutcome, ToolError> {
        *lock(&self.files) = files.clone();

        let (reply, subscriptions) = self.await_build_reply();
        self.set_status(if install_deps {
            BuildStatus::Installing
        } else {
            BuildStatus::Building
        });
        info!(files = files.len(), install_deps, "Requesting sandbox build");

        let request = create_message(MessageType::BuildRequest, BuildRequestPayload { files, install_deps });
        let request_id = request.id.clone();
        let sent = self.bridge.send_message(request).await;
        if let Err(e) = sent {
            subscriptions.iter().for_each(Subscription::unsubscribe);
            self.set_status(BuildStatus::Error);
            return Err(ToolError::ExecutionFailed {
                tool_name: "build".into(),
                reason: e.to_string(),
            });
        }

        let waited = tokio::time::timeout(self.build_timeout, reply).await;
        subscriptions.iter().for_each(Subscription::unsubscribe);

        match waited {
            Ok(Ok(Ok(complete))) => {
                info!(duration_ms = complete.duration_ms, preview_url = ?complete.preview_url, "Sandbox build complete");
                let mut observed = lock(&self.observed);
                observed.status = BuildStatus::Running;
                if complete.preview_url.is_some() {
                    observed.preview_url = complete.preview_url.clone();
                }
                Ok(BuildOutcome {
                    success: true,
                    preview_url: observed.preview_url.clone(),
                    duration_ms: Some(complete.duration_ms),
                    error: None,
                })
            }
            Ok(Ok(Err(failure))) => {
                warn!(error = %failure.error, "Sandbox build failed");
                self.set_status(BuildStatus::Error);
                let error = match failure.details {
                    Some(details) => format!("{}\n{details}", failure.error),
                    None => failure.error,
                };
                self.logs.push(format!("[build] {error}"));
                Ok(BuildOutcome {
                    success: false,
                    preview_url: None,
                    duration_ms: None,
                    error: Some(error),
                })
            }
            Ok(Err(_)) => {
                self.set_status(BuildStatus::Error);
                Err(ToolError::ExecutionFailed {
                    tool_name: "build".into(),
                    reason: BridgeError::Destroyed.to_string(),
                })
            }
            Err(_) => {
                warn!(timeout_secs = self.build_timeout.as_secs(), "Sandbox build timed out");
                // A request still queued must not run once the bridge connects
                self.bridge.retract(&request_id);
                self.set_status(BuildStatus::Error);
                Err(ToolError::Timeout {
                    tool_name: "build".into(),
                    timeout_secs: self.build_timeout.as_secs(),
                })
            }
        }
    }

    async fn stop(&self) -> Result<(), ToolError> {
        self.bridge
            .send(MessageType::StopExtension, serde_json::json!({}))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "stop_preview".into(),
                reason: e.to_string(),
            })?;
        let mut observed = lock(&self.observed);
        observed.status = BuildStatus::Idle;
        observed.preview_url = None;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.status() == BuildStatus::Running
    }

    async fn run_command(&self, command: &str, _args: &[String]) -> Result<CommandOutput, ToolError> {
        Err(ToolError::PermissionDenied {
            tool_name: "run_command".into(),
            reason: format!("the sandbox does not run shell commands ('{command}'); use build instead"),
        })
    }

    async fn get_logs(&self) -> Vec<String> {
        lock(&self.logs.lines).iter().cloned().collect()
    }

    async fn clear_logs(&self) {
        lock(&self.logs.lines).clear();
    }

    async fn write_to_terminal(&self, data: &str) -> Result<(), ToolError> {
        self.bridge
            .send(MessageType::TerminalInput, TerminalPayload { data: data.to_string() })
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "terminal".into(),
                reason: e.to_string(),
            })
    }
}
