//! Message Bus Module
//!
//! This module provides the duplex request/response plus publish/subscribe
//! protocol connecting the core to its front ends. A `MessageBus` sits on
//! one end of a [`Transport`]; the peer bus (a TUI, a socket server, a test
//! harness) sits on the other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  request/event   ┌─────────────┐  request/event  ┌─────────────┐
//! │  Front end  │<────────────────>│  Transport  │<───────────────>│    Core     │
//! │ (peer bus)  │                  │ (pipe/sock) │                 │ (MessageBus)│
//! └─────────────┘                  └─────────────┘                 └─────────────┘
//! ```
//!
//! Each side keeps its own outstanding-request table keyed by request id.
//! Responses match by id only; a response with an unrecognized id is
//! dropped silently, which defends against duplicate or late delivery.
//!
//! # Example
//!
//! ```
//! use clawcore::bus::MessageBus;
//! use serde_json::{json, Value};
//!
//! # tokio_test::block_on(async {
//! let (front, core) = MessageBus::over_pipe();
//! front.start();
//! core.start();
//!
//! core.register_handler("session.ping", |params: Value| {
//!     Box::pin(async move { Ok(json!({"echo": params})) })
//! });
//!
//! let reply: Value = front
//!     .request("session.ping", json!({"n": 1}), None)
//!     .await
//!     .unwrap();
//! assert_eq!(reply["echo"]["n"], 1);
//! # });
//! ```

mod envelope;
mod transport;

pub use envelope::{Envelope, ErrorPayload};
pub use transport::{PipeTransport, Transport, DEFAULT_BUFFER_CAPACITY};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

/// What a request handler resolves to.
pub type HandlerResult = std::result::Result<Value, ErrorPayload>;

/// The boxed future a request handler returns.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

type RequestHandlerFn = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;
type EventHandlerFn = Arc<dyn Fn(Value) + Send + Sync>;

struct BusInner {
    /// The wire
    transport: Arc<dyn Transport>,
    /// Next request/event id for this side
    next_id: AtomicU64,
    /// Outstanding requests awaiting a response, keyed by id
    pending: Mutex<HashMap<u64, oneshot::Sender<HandlerResult>>>,
    /// Request handlers by method name (last registration wins)
    handlers: Mutex<HashMap<String, RequestHandlerFn>>,
    /// Event subscribers by topic
    subscribers: Mutex<HashMap<String, Vec<EventHandlerFn>>>,
}

/// One side of the bus protocol.
///
/// Construct with [`MessageBus::new`] over any transport, then call
/// [`start`](MessageBus::start) to spawn the dispatch pump. Requests made
/// before `start` never resolve. Cloning shares the same underlying bus.
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl MessageBus {
    /// Create a bus over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                transport,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                handlers: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create two buses over an in-process pipe pair.
    pub fn over_pipe() -> (Self, Self) {
        let (a, b) = PipeTransport::connected_pair();
        (Self::new(Arc::new(a)), Self::new(Arc::new(b)))
    }

    /// Spawn the dispatch pump. Returns its join handle; the pump exits
    /// when the transport closes.
    pub fn start(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(envelope) = inner.transport.recv().await {
                inner.dispatch(envelope).await;
            }
            debug!("Bus transport closed, dispatch pump exiting");
        })
    }

    /// Send a correlated request and await the remote handler's result.
    ///
    /// # Arguments
    /// * `method` - Dot-namespaced method name (e.g. `session.send`)
    /// * `params` - Request parameters, serialized to JSON
    /// * `timeout` - Optional deadline; `None` waits indefinitely
    ///
    /// # Errors
    /// - `CoreError::Bus` on handler error, missing remote handler, or
    ///   timeout (code `"timeout"`)
    /// - `CoreError::Transport` when the transport is disconnected
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<R> {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().unwrap().insert(id, tx);

        let params = serde_json::to_value(params)?;
        if let Err(e) = inner
            .transport
            .send(Envelope::request(id, method, params))
            .await
        {
            inner.pending.lock().unwrap().remove(&id);
            return Err(e);
        }
        debug!(id = id, method = method, "Sent request");

        let received = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(received) => received,
                Err(_) => {
                    inner.pending.lock().unwrap().remove(&id);
                    return Err(CoreError::bus(
                        "timeout",
                        format!("request '{}' timed out after {:?}", method, deadline),
                    ));
                }
            },
            None => rx.await,
        };

        let outcome = received.map_err(|_| {
            CoreError::Transport("bus dropped before the response arrived".into())
        })?;
        let value = outcome.map_err(|e| CoreError::Bus {
            message: e.message,
            code: e.code,
            detail: e.detail,
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Install a request handler for a method. One handler per method;
    /// the last registration wins.
    ///
    /// The handler receives the request params and returns a boxed future
    /// resolving to a result value or an [`ErrorPayload`].
    pub fn register_handler<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> HandlerFuture + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .lock()
            .unwrap()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Publish an uncorrelated event to the peer.
    pub async fn emit_event<D: Serialize>(&self, topic: &str, data: D) -> Result<()> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let data = serde_json::to_value(data)?;
        self.inner
            .transport
            .send(Envelope::event(id, topic, data))
            .await
    }

    /// Subscribe to events on a topic arriving from the peer. Multiple
    /// subscribers per topic are supported; subscribers live for the bus
    /// lifetime.
    pub fn on_event<F>(&self, topic: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
    }
}

impl BusInner {
    /// Route one incoming envelope.
    async fn dispatch(&self, envelope: Envelope) {
        match envelope {
            Envelope::Request {
                id, method, params, ..
            } => {
                let handler = self.handlers.lock().unwrap().get(&method).cloned();
                match handler {
                    Some(handler) => {
                        // Run the handler in its own task so a slow handler
                        // cannot stall the pump (or deadlock a handler that
                        // itself issues a request on this bus).
                        let transport = Arc::clone(&self.transport);
                        let future = handler(params);
                        tokio::spawn(async move {
                            let response = match future.await {
                                Ok(value) => Envelope::response_ok(id, value),
                                Err(error) => Envelope::response_err(id, error),
                            };
                            if let Err(e) = transport.send(response).await {
                                warn!(id = id, error = %e, "Failed to send response");
                            }
                        });
                    }
                    None => {
                        let response = Envelope::response_err(
                            id,
                            ErrorPayload::new(
                                "method_not_found",
                                format!("no handler registered for '{}'", method),
                            ),
                        );
                        if let Err(e) = self.transport.send(response).await {
                            warn!(id = id, error = %e, "Failed to send error response");
                        }
                    }
                }
            }
            Envelope::Response {
                id, result, error, ..
            } => {
                let waiter = self.pending.lock().unwrap().remove(&id);
                match waiter {
                    Some(tx) => {
                        let outcome = match error {
                            Some(e) => Err(e),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        // The requester may have timed out and dropped rx.
                        let _ = tx.send(outcome);
                    }
                    None => {
                        // Duplicate or late delivery: drop silently.
                        debug!(id = id, "Dropping response with unrecognized id");
                    }
                }
            }
            Envelope::Event { topic, data, .. } => {
                let subs = self
                    .subscribers
                    .lock()
                    .unwrap()
                    .get(&topic)
                    .cloned()
                    .unwrap_or_default();
                for sub in subs {
                    // One subscriber's panic never blocks delivery to the others.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        sub(data.clone())
                    }));
                    if result.is_err() {
                        warn!(topic = %topic, "Event subscriber panicked");
                    }
                }
            }
        }
    }
}
