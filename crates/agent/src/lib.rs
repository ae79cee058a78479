//! The agent orchestration loop for extforge.
//!
//! One user turn follows a **call → act → observe** cycle:
//!
//! 1. **Receive** the user message and append it to the conversation
//! 2. **Resolve** the system prompt (configured or built-in, plus the file listing)
//! 3. **Call** the provider with the full history and the tool catalog
//! 4. **If tool calls**: drop repeats and no-op writes, execute the rest,
//!    answer every call in order, loop back to step 3
//! 5. **If text**: finish the turn with that answer
//!
//! The loop also stops on a provider error, on cancellation, or when the
//! iteration limit is reached.

pub mod loop_runner;
pub mod optimizer;
pub mod prompt;
pub mod result;

pub use loop_runner::{AgentLoop, CancelHandle, DEFAULT_MAX_ITERATIONS};
pub use optimizer::{Partition, ToolCallOptimizer, canonical_json, signature};
pub use result::AiServiceResult;
