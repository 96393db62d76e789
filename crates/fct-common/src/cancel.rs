//! Cancellation token shared by flow tasks, job supervisors and servers.
//!
//! A [`Cancel`] is a cloneable handle over a `watch` channel. Every clone
//! observes the same state; [`Cancel::child`] derives a token that is
//! cancelled together with its parent but can also be cancelled on its own
//! without affecting the parent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Cloneable cancellation token.
#[derive(Clone, Debug)]
pub struct Cancel {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancel {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel this token and every child derived from it. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled. Returns immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a
        // closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Derive a token that is cancelled when `self` is, and may also be
    /// cancelled independently.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn child(&self) -> Cancel {
        let child = Cancel::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }

        let parent = self.clone();
        let linked = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => linked.cancel(),
                _ = linked.cancelled() => {}
            }
        });
        child
    }

    /// Derive a child token that cancels itself after `timeout`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Cancel {
        let child = self.child();
        let deadline = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "deadline expired");
                    deadline.cancel();
                }
                _ = deadline.cancelled() => {}
            }
        });
        child
    }
}
