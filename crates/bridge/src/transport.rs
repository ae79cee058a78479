//! Transports carry raw protocol values between the two sides.
//!
//! The bridge only needs to post values out; inbound values arrive on a
//! receiver the bridge pumps with [`crate::Bridge::listen`].

use async_trait::async_trait;
use extforge_core::error::BridgeError;
use serde_json::Value;
use tokio::sync::mpsc;

/// Outbound half of a cross-context message channel.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, message: Value) -> Result<(), BridgeError>;
}

/// In-process transport over a tokio channel.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Value>,
}

/// One side of a connected pair: where to post, and what arrives.
pub struct TransportEnd {
    pub transport: ChannelTransport,
    pub inbound: mpsc::Receiver<Value>,
}

impl ChannelTransport {
    const CAPACITY: usize = 256;

    pub fn new(tx: mpsc::Sender<Value>) -> Self {
        Self { tx }
    }

    /// Two ends wired to each other: what one posts, the other receives.
    pub fn pair() -> (TransportEnd, TransportEnd) {
        let (a_tx, a_rx) = mpsc::channel(Self::CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(Self::CAPACITY);
        (
            TransportEnd {
                transport: ChannelTransport::new(b_tx),
                inbound: a_rx,
            },
            TransportEnd {
                transport: ChannelTransport::new(a_tx),
                inbound: b_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn post(&self, message: Value) -> Result<(), BridgeError> {
        self.tx.send(message).await.map_err(|_| BridgeError::TransportClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pair_delivers_both_ways() {
        let (mut host, mut sandbox) = ChannelTransport::pair();

        host.transport.post(json!({"n": 1})).await.unwrap();
        sandbox.transport.post(json!({"n": 2})).await.unwrap();

        assert_eq!(sandbox.inbound.recv().await.unwrap()["n"], 1);
        assert_eq!(host.inbound.recv().await.unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn closed_peer_is_reported() {
        let (host, sandbox) = ChannelTransport::pair();
        drop(sandbox);
        let err = host.transport.post(json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::TransportClosed));
    }
}
