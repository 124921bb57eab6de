//! Cancellation-scoped execution contexts.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// A cancellation scope handed to step actions.
///
/// A context ends when its [`CancelHandle`] fires or its deadline passes.
/// The coordinator holds two of them: the operation context that follows
/// the inbound request, and a separate compensation context with its own
/// budget so rollback still runs after the client has gone away.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cancelled: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the [`ExecutionContext`] it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl ExecutionContext {
    /// A context that never ends.
    pub fn background() -> Self {
        Self {
            cancelled: None,
            deadline: None,
        }
    }

    /// A context that ends after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// A context that ends when the returned handle is cancelled.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancelled: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Tightens the deadline to at most `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(candidate),
            None => candidate,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, or `None` if there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns true once the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the context ends. Never resolves for [`ExecutionContext::background`].
    pub async fn done(&self) {
        let cancelled = async {
            match self.cancelled.clone() {
                Some(mut rx) => {
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        // Handle dropped without cancelling.
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            () = cancelled => {}
            () = expired => {}
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_ends() {
        let ctx = ExecutionContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_cancel_handle_ends_context_and_clones() {
        let (ctx, handle) = ExecutionContext::cancellable();
        let clone = ctx.clone();
        assert!(!ctx.is_done());
        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(clone.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_context() {
        let ctx = ExecutionContext::with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_done());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_only_tightens() {
        let ctx = ExecutionContext::with_timeout(Duration::from_secs(5)).timeout(Duration::from_secs(60));
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_done_resolves_on_cancel() {
        let (ctx, handle) = ExecutionContext::cancellable();
        let waiter = tokio::spawn(async move { ctx.done().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("done() should resolve after cancel")
            .unwrap();
    }
}
