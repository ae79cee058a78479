//! The bridge: connection lifecycle, outbound queue and handler dispatch.
//!
//! Nothing but handshake traffic goes out before the peer has acknowledged a
//! handshake. Everything else waits in a single FIFO queue that is drained,
//! in order, the moment the connection is established.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use extforge_core::error::BridgeError;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{
    HandshakePayload, MessageType, ProtocolMessage, create_message, is_compatible_version, parse_message,
};
use crate::transport::Transport;

type Handler = Arc<dyn Fn(&ProtocolMessage) + Send + Sync>;

struct Registration {
    id: u64,
    message_type: MessageType,
    handler: Handler,
}

#[derive(Default)]
struct State {
    connected: bool,
    flushing: bool,
    destroyed: bool,
    queue: VecDeque<ProtocolMessage>,
    handlers: Vec<Registration>,
    next_id: u64,
}

struct Inner {
    transport: Arc<dyn Transport>,
    state: Mutex<State>,
    connected: watch::Sender<bool>,
    shutdown: CancellationToken,
}

/// One endpoint of the sandbox protocol. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

/// Returned by [`Bridge::on`]. Dropping it keeps the handler registered.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove the handler. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.handlers.retain(|r| r.id != self.id);
        }
    }
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                transport,
                state: Mutex::new(State::default()),
                connected,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Messages waiting for the connection.
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    /// Start the handshake. The bridge connects once the peer answers `ready`.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        info!("Sending sandbox handshake");
        self.send(MessageType::Handshake, HandshakePayload::default()).await
    }

    /// Wait until the handshake has been acknowledged.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), BridgeError> {
        if self.is_destroyed() {
            return Err(BridgeError::Destroyed);
        }
        let mut rx = self.inner.connected.subscribe();

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => Err(BridgeError::Destroyed),
            waited = tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)) => match waited {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(_)) => Err(BridgeError::Destroyed),
                Err(_) => Err(BridgeError::Timeout("sandbox handshake".into())),
            },
        }
    }

    /// Send a typed payload, queueing it until the bridge is connected.
    pub async fn send(&self, message_type: MessageType, payload: impl Serialize) -> Result<(), BridgeError> {
        self.send_message(create_message(message_type, payload)).await
    }

    pub async fn send_message(&self, message: ProtocolMessage) -> Result<(), BridgeError> {
        {
            let mut state = self.state();
            if state.destroyed {
                return Err(BridgeError::Destroyed);
            }
            // Queued messages must go first, so queue while a flush is running too
            if !message.message_type.is_handshake() && (!state.connected || state.flushing) {
                debug!(
                    message_type = %message.message_type,
                    queued = state.queue.len() + 1,
                    "Queueing message until connected"
                );
                state.queue.push_back(message);
                return Ok(());
            }
        }
        self.post(&message).await
    }

    /// Drop a message that is still waiting for the connection.
    ///
    /// Returns `false` when it already went out or was never queued.
    pub fn retract(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.queue.len();
        state.queue.retain(|m| m.id != id);
        let retracted = state.queue.len() < before;
        if retracted {
            debug!(id, "Retracted queued message");
        }
        retracted
    }

    async fn post(&self, message: &ProtocolMessage) -> Result<(), BridgeError> {
        debug!(message_type = %message.message_type, id = %message.id, "Posting message");
        self.inner.transport.post(message.to_value()).await
    }

    /// Register a handler for one message type.
    pub fn on<F>(&self, message_type: MessageType, handler: F) -> Subscription
    where
        F: Fn(&ProtocolMessage) + Send + Sync + 'static,
    {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        if state.destroyed {
            warn!(message_type = %message_type, "Handler registered on a destroyed bridge will never fire");
        } else {
            state.handlers.push(Registration {
                id,
                message_type,
                handler: Arc::new(handler),
            });
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Process one raw inbound value. Foreign or incompatible traffic is dropped.
    pub async fn handle_incoming(&self, raw: Value) {
        let Some(message) = parse_message(&raw) else {
            return;
        };
        if self.is_destroyed() {
            return;
        }

        match message.message_type {
            MessageType::Handshake => {
                if let Some(handshake) = message.payload_as::<HandshakePayload>()
                    && !is_compatible_version(&handshake.version)
                {
                    warn!(version = %handshake.version, "Ignoring handshake from incompatible peer");
                    return;
                }
                debug!("Peer handshake received, answering ready");
                if let Err(e) = self.send(MessageType::Ready, HandshakePayload::default()).await {
                    warn!(error = %e, "Failed to answer peer handshake");
                    return;
                }
                self.mark_connected().await;
            }
            MessageType::Ready => self.mark_connected().await,
            _ => {}
        }

        self.dispatch(&message);
    }

    async fn mark_connected(&self) {
        let (newly_connected, start_flush) = {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            let newly_connected = !state.connected;
            state.connected = true;
            let start_flush = !state.flushing && !state.queue.is_empty();
            if start_flush {
                state.flushing = true;
            }
            (newly_connected, start_flush)
        };

        if newly_connected {
            info!("Sandbox bridge connected");
            self.inner.connected.send_replace(true);
        }
        if start_flush {
            self.flush().await;
        }
    }

    async fn flush(&self) {
        loop {
            let next = {
                let mut state = self.state();
                if state.destroyed {
                    state.flushing = false;
                    state.queue.clear();
                    return;
                }
                match state.queue.pop_front() {
                    Some(message) => message,
                    None => {
                        state.flushing = false;
                        return;
                    }
                }
            };
            if let Err(e) = self.post(&next).await {
                warn!(message_type = %next.message_type, error = %e, "Failed to flush queued message");
            }
        }
    }

    fn dispatch(&self, message: &ProtocolMessage) {
        let handlers: Vec<(u64, Handler)> = self
            .state()
            .handlers
            .iter()
            .filter(|r| r.message_type == message.message_type)
            .map(|r| (r.id, r.handler.clone()))
            .collect();

        for (id, handler) in handlers {
            // An earlier handler may have unsubscribed this one or destroyed the bridge
            if !self.is_registered(id) {
                continue;
            }
            handler(message);
        }
    }

    fn is_registered(&self, id: u64) -> bool {
        let state = self.state();
        !state.destroyed && state.handlers.iter().any(|r| r.id == id)
    }

    /// Pump `inbound` into this bridge until it closes or the bridge is destroyed.
    pub fn listen(&self, mut inbound: mpsc::Receiver<Value>) -> JoinHandle<()> {
        let bridge = self.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = inbound.recv() => match next {
                        Some(raw) => bridge.handle_incoming(raw).await,
                        None => {
                            debug!("Transport closed, bridge listener stopping");
                            break;
                        }
                    },
                }
            }
        })
    }

    /// Drop all handlers and queued messages and stop listening.
    pub fn destroy(&self) {
        {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.connected = false;
            state.handlers.clear();
            state.queue.clear();
        }
        self.inner.shutdown.cancel();
        self.inner.connected.send_replace(false);
        info!("Sandbox bridge destroyed");
    }
}
