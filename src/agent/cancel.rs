//! Cooperative cancellation for loop runs.
//!
//! A `CancelToken` is a shared flag plus a notification channel. The loop
//! checks the flag at its suspension points (turn start, stream chunks,
//! retry waits) and races long sleeps against the notification, so
//! cancellation is edge-triggered: raised between checks, observed at the
//! next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

struct Inner {
    canceled: AtomicBool,
    tx: watch::Sender<bool>,
}

/// A cloneable cancellation token shared by one loop invocation.
///
/// # Example
///
/// ```
/// use clawcore::agent::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(!token.is_canceled());
///
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_canceled());
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a new, uncanceled token.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Raise the cancellation flag and wake any waiter.
    ///
    /// Idempotent: cancelling twice is the same as cancelling once.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        let _ = self.inner.tx.send(true);
    }

    /// Check the flag without waiting.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Wait until the token is canceled.
    ///
    /// Used to race backoff sleeps against cancellation. Returns
    /// immediately if already canceled.
    pub async fn cancelled(&self) {
        if self.is_canceled() {
            return;
        }
        let mut rx = self.inner.tx.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            // The sender lives in our own Arc, so changed() cannot fail
            // while we hold it.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
