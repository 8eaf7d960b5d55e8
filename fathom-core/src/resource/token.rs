//! Cancellation Tokens
//!
//! Every fetch gets a fresh [`CancelToken`]. Starting the next fetch, a
//! falsy source, deactivation and disposal cancel it. Fetchers may watch the
//! token to abort early; the resource discards a cancelled fetch's outcome
//! either way.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-shot, clonable cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Fails only when the sender is gone, and `self` holds it.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
