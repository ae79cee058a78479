//! Error types for the extforge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for extforge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Sandbox bridge errors ---
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// The user stopped the turn. Not a failure.
    #[error("Request was cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
        raw: Option<serde_json::Value>,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// The raw vendor payload attached to this error, if the vendor sent one.
    pub fn raw(&self) -> Option<serde_json::Value> {
        match self {
            ProviderError::ApiError { raw, .. } => raw.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("Transport closed")]
    TransportClosed,

    #[error("Bridge has been destroyed")]
    Destroyed,

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
            raw: None,
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn provider_error_exposes_raw_payload() {
        let err = ProviderError::ApiError {
            status_code: 400,
            message: "bad".into(),
            raw: Some(serde_json::json!({"error": {"type": "invalid_request"}})),
        };
        assert_eq!(err.raw().unwrap()["error"]["type"], "invalid_request");
        assert!(ProviderError::Network("down".into()).raw().is_none());
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "run_command".into(),
            reason: "command not in allowlist".into(),
        });
        assert!(err.to_string().contains("run_command"));
        assert!(err.to_string().contains("allowlist"));
    }

    #[test]
    fn cancelled_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Tool(ToolError::NotFound("deploy".into())).is_cancelled());
    }
}
