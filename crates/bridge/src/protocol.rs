//! Wire model of the sandbox transport protocol.
//!
//! Every message is a JSON object:
//!
//! ```json
//! {"channel": "extforge-sandbox", "version": "1.0.0", "type": "build_request",
//!  "id": "...", "timestamp": 1718000000000, "payload": {...}}
//! ```
//!
//! Inbound traffic that does not carry our channel tag or a known type is
//! not ours and is dropped without complaint.

use chrono::Utc;
use extforge_core::context::FileMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::status::BuildStatus;

/// Tag identifying this protocol family.
pub const CHANNEL: &str = "extforge-sandbox";

/// Semantic version spoken by this side.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Every message type the protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Handshake,
    Ready,
    BuildRequest,
    BuildProgress,
    BuildComplete,
    BuildError,
    FileUpdate,
    RunExtension,
    RunExtensionAck,
    StopExtension,
    StopExtensionAck,
    Log,
    TerminalInput,
    TerminalOutput,
    Status,
    Error,
    PreviewUrl,
}

impl MessageType {
    pub const ALL: [MessageType; 17] = [
        MessageType::Handshake,
        MessageType::Ready,
        MessageType::BuildRequest,
        MessageType::BuildProgress,
        MessageType::BuildComplete,
        MessageType::BuildError,
        MessageType::FileUpdate,
        MessageType::RunExtension,
        MessageType::RunExtensionAck,
        MessageType::StopExtension,
        MessageType::StopExtensionAck,
        MessageType::Log,
        MessageType::TerminalInput,
        MessageType::TerminalOutput,
        MessageType::Status,
        MessageType::Error,
        MessageType::PreviewUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Handshake => "handshake",
            MessageType::Ready => "ready",
            MessageType::BuildRequest => "build_request",
            MessageType::BuildProgress => "build_progress",
            MessageType::BuildComplete => "build_complete",
            MessageType::BuildError => "build_error",
            MessageType::FileUpdate => "file_update",
            MessageType::RunExtension => "run_extension",
            MessageType::RunExtensionAck => "run_extension_ack",
            MessageType::StopExtension => "stop_extension",
            MessageType::StopExtensionAck => "stop_extension_ack",
            MessageType::Log => "log",
            MessageType::TerminalInput => "terminal_input",
            MessageType::TerminalOutput => "terminal_output",
            MessageType::Status => "status",
            MessageType::Error => "error",
            MessageType::PreviewUrl => "preview_url",
        }
    }

    /// Look up a type by its wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Handshake traffic establishes the connection and is never queued.
    pub fn is_handshake(&self) -> bool {
        matches!(self, MessageType::Handshake | MessageType::Ready)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub channel: String,

    pub version: String,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    #[serde(default)]
    pub id: String,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ProtocolMessage {
    /// Decode the payload into its typed shape.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_value(self.payload.clone()) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!(message_type = %self.message_type, error = %e, "Payload does not match its type");
                None
            }
        }
    }

    /// The raw JSON form posted over a transport.
    pub fn to_value(&self) -> Value {
        json!({
            "channel": self.channel,
            "version": self.version,
            "type": self.message_type.as_str(),
            "id": self.id,
            "timestamp": self.timestamp,
            "payload": self.payload,
        })
    }
}

/// Stamp a new outbound message.
pub fn create_message(message_type: MessageType, payload: impl Serialize) -> ProtocolMessage {
    let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
        warn!(message_type = %message_type, error = %e, "Payload could not be serialized");
        empty_payload()
    });

    ProtocolMessage {
        channel: CHANNEL.to_string(),
        version: PROTOCOL_VERSION.to_string(),
        message_type,
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now().timestamp_millis(),
        payload,
    }
}

/// Whether `raw` is one of ours: an object with our channel and a known type.
pub fn is_valid_message(raw: &Value) -> bool {
    let Some(object) = raw.as_object() else {
        return false;
    };
    object.get("channel").and_then(Value::as_str) == Some(CHANNEL)
        && object
            .get("type")
            .and_then(Value::as_str)
            .and_then(MessageType::from_wire)
            .is_some()
}

/// Peers are compatible when their major versions match.
pub fn is_compatible_version(version: &str) -> bool {
    match (major(version), major(PROTOCOL_VERSION)) {
        (Some(theirs), Some(ours)) => theirs == ours,
        _ => false,
    }
}

fn major(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}

/// Accept a raw inbound value as a message, or drop it.
pub fn parse_message(raw: &Value) -> Option<ProtocolMessage> {
    if !is_valid_message(raw) {
        return None;
    }

    let message: ProtocolMessage = match serde_json::from_value(raw.clone()) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Dropping malformed protocol message");
            return None;
        }
    };

    if !is_compatible_version(&message.version) {
        debug!(
            version = %message.version,
            ours = PROTOCOL_VERSION,
            message_type = %message.message_type,
            "Dropping message from incompatible protocol version"
        );
        return None;
    }

    Some(message)
}

// ── Payloads ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl Default for HandshakePayload {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildRequestPayload {
    pub files: FileMap,

    #[serde(default)]
    pub install_deps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProgressPayload {
    pub stage: BuildStatus,

    #[serde(default)]
    pub message: String,

    /// Percent complete, when the sandbox knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildCompletePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,

    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildErrorPayload {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A file changed on the host. `content: None` means it was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpdatePayload {
    pub path: String,

    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckPayload {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    #[serde(default)]
    pub level: LogLevel,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalPayload {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: BuildStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewUrlPayload {
    pub url: String,
}
