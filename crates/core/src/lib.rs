//! # extforge core
//!
//! Domain types, traits, and error definitions for the extforge agent engine.
//! The crate carries no framework dependencies: it defines the model that the
//! provider adapters, the tool catalog, the orchestration loop and the sandbox
//! bridge all implement against.
//!
//! ## Seams
//!
//! - [`ProviderAdapter`]: one implementation per AI vendor wire format
//! - [`ToolExecutionContext`]: the host capability set tools act through
//! - [`EventBus`]: observers of the orchestration loop

pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{BuildOutcome, CommandOutput, FileMap, ToolExecutionContext};
pub use error::{BridgeError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{AiResponse, ChatRequest, ProviderAdapter, ToolDefinition};
pub use tool::{ToolCall, ToolResult};
