//! Pluggable transports for the message bus.
//!
//! The bus speaks [`Envelope`]s over anything implementing [`Transport`].
//! This module ships the in-process pipe variant; a socket transport plugs
//! in behind the same trait from outside the crate.
//!
//! The pipe tolerates construction-order races: an unpaired endpoint
//! buffers outgoing envelopes (bounded) and flushes them in original send
//! order when its peer attaches. Exceeding the bound is a hard transport
//! error, never a silent drop.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tracing::debug;

use crate::error::{CoreError, Result};

use super::envelope::Envelope;

/// Default capacity of the pre-pairing send buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// A duplex envelope transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one envelope to the peer.
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Receive the next envelope from the peer. `None` means the peer is
    /// gone and no more envelopes will arrive.
    async fn recv(&self) -> Option<Envelope>;
}

enum SendState {
    /// Not yet paired: outgoing envelopes accumulate up to `capacity`.
    Unpaired {
        buffer: Vec<Envelope>,
        capacity: usize,
    },
    /// Paired: envelopes go straight to the peer's incoming queue.
    Paired {
        peer: mpsc::UnboundedSender<Envelope>,
    },
}

/// In-process pipe transport endpoint.
///
/// # Example
///
/// ```
/// use clawcore::bus::{Envelope, PipeTransport, Transport};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let (a, b) = PipeTransport::connected_pair();
/// a.send(Envelope::event(1, "ping", json!({}))).await.unwrap();
/// let received = b.recv().await.unwrap();
/// assert_eq!(received.id(), 1);
/// # });
/// ```
pub struct PipeTransport {
    /// Sender for envelopes addressed to this endpoint. Taken by the peer
    /// at pairing time, so endpoint drop closes the peer's recv stream.
    handle: StdMutex<Option<mpsc::UnboundedSender<Envelope>>>,
    /// Outgoing side: buffer until paired, then the peer's sender.
    send_state: StdMutex<SendState>,
    /// Incoming queue.
    incoming: TokioMutex<mpsc::UnboundedReceiver<Envelope>>,
}

impl PipeTransport {
    /// Create an unpaired endpoint with the default buffer capacity.
    pub fn unpaired() -> Self {
        Self::with_buffer_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create an unpaired endpoint with a custom buffer capacity.
    pub fn with_buffer_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: StdMutex::new(Some(tx)),
            send_state: StdMutex::new(SendState::Unpaired {
                buffer: Vec::new(),
                capacity,
            }),
            incoming: TokioMutex::new(rx),
        }
    }

    /// Create two endpoints already paired with each other.
    pub fn connected_pair() -> (Self, Self) {
        let a = Self::unpaired();
        let b = Self::unpaired();
        // Freshly constructed endpoints cannot already be paired.
        Self::pair(&a, &b).expect("fresh endpoints must pair");
        (a, b)
    }

    /// Pair two endpoints, flushing both pre-pairing buffers in original
    /// send order.
    ///
    /// # Errors
    /// - `CoreError::Transport` if either endpoint is already paired.
    pub fn pair(a: &PipeTransport, b: &PipeTransport) -> Result<()> {
        let a_tx = a
            .handle
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| CoreError::Transport("endpoint already paired".into()))?;
        let b_tx = match b.handle.lock().unwrap().take() {
            Some(tx) => tx,
            None => {
                // Roll back so `a` stays usable.
                *a.handle.lock().unwrap() = Some(a_tx);
                return Err(CoreError::Transport("endpoint already paired".into()));
            }
        };

        Self::attach(a, b_tx);
        Self::attach(b, a_tx);
        debug!("pipe transport paired");
        Ok(())
    }

    /// Point `endpoint`'s outgoing side at `peer_tx`, flushing its buffer.
    fn attach(endpoint: &PipeTransport, peer_tx: mpsc::UnboundedSender<Envelope>) {
        let mut state = endpoint.send_state.lock().unwrap();
        if let SendState::Unpaired { buffer, .. } = &mut *state {
            for envelope in buffer.drain(..) {
                // The peer's receiver is alive: we hold its sender.
                let _ = peer_tx.send(envelope);
            }
        }
        *state = SendState::Paired { peer: peer_tx };
    }
}

#[async_trait]
impl Transport for PipeTransport {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        let mut state = self.send_state.lock().unwrap();
        match &mut *state {
            SendState::Unpaired { buffer, capacity } => {
                if buffer.len() >= *capacity {
                    return Err(CoreError::Transport(format!(
                        "pre-pairing buffer overflow ({} envelopes)",
                        capacity
                    )));
                }
                buffer.push(envelope);
                Ok(())
            }
            SendState::Paired { peer } => peer
                .send(envelope)
                .map_err(|_| CoreError::Transport("peer disconnected".into())),
        }
    }

    async fn recv(&self) -> Option<Envelope> {
        self.incoming.lock().await.recv().await
    }
}
