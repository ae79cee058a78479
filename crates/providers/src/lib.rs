//! AI provider adapters for extforge.
//!
//! All adapters implement `extforge_core::ProviderAdapter`. Vendors that
//! share the OpenAI chat-completions schema reuse the conversion functions in
//! [`openai_wire`] instead of each carrying their own copy. The router builds
//! every adapter once, up front, from configuration.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod openai_compat;
pub mod openai_wire;
pub mod router;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use router::{ProviderRouter, build_from_config};
