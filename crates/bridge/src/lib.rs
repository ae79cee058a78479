//! Build/preview transport for extforge.
//!
//! The agent's build and preview operations run in an isolated execution
//! context (a sandboxed frame, a worker, a separate process). This crate is
//! the versioned message protocol between the host and that context, the
//! [`Bridge`] that speaks it, and [`SandboxContext`], a tool execution
//! context whose builds go through the bridge.

pub mod bridge;
pub mod protocol;
pub mod sandbox;
pub mod status;
pub mod transport;

pub use bridge::{Bridge, Subscription};
pub use protocol::{
    CHANNEL, MessageType, PROTOCOL_VERSION, ProtocolMessage, create_message, is_compatible_version,
    is_valid_message, parse_message,
};
pub use sandbox::SandboxContext;
pub use status::BuildStatus;
pub use transport::{ChannelTransport, Transport, TransportEnd};
