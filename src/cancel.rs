//! Cooperative cancellation tokens.
//!
//! Every runtime invocation receives a [`CancelToken`]. Tokens form a
//! chain: cancelling a parent cancels every child derived from it, while a
//! child can be cancelled without touching its parent. This carries the
//! three signal sources the executor needs (the per-run signal, a
//! `timeout` container's per-scope signal, and per-attempt retry
//! deadlines) through one type.
//!
//! Cancellation is cooperative: runtimes observe it at their suspension
//! points via [`CancelToken::cancelled`] or by polling
//! [`CancelToken::is_cancelled`].

use std::sync::Arc;
use tokio::sync::watch;

/// A cancellation handle linked to its ancestors.
#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    /// Own receiver first, then ancestors'.
    receivers: Vec<watch::Receiver<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A fresh root token.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receivers: vec![receiver],
        }
    }

    /// Derive a child token: cancelled when either it or any ancestor is.
    #[must_use]
    pub fn child(&self) -> Self {
        let (sender, receiver) = watch::channel(false);
        let mut receivers = vec![receiver];
        receivers.extend(self.receivers.iter().cloned());
        Self {
            sender: Arc::new(sender),
            receivers,
        }
    }

    /// Cancel this token (and transitively everything derived from it).
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receivers.iter().any(|rx| *rx.borrow())
    }

    /// Resolve once this token or any ancestor is cancelled.
    pub async fn cancelled(&self) {
        let waiters: Vec<_> = self
            .receivers
            .iter()
            .map(|rx| {
                let mut rx = rx.clone();
                Box::pin(async move {
                    // A closed channel without a cancel signal means the
                    // ancestor can never fire; park that branch forever.
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
            })
            .collect();
        futures_util::future::select_all(waiters).await;
    }
}
