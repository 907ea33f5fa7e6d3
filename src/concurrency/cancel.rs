//! Cancel scopes: a tree of cancellable nodes built on [`CancellationToken`].
//!
//! Cancellation here is state, not an edge: once a scope's token is
//! cancelled, every subsequent await against it observes the cancellation,
//! not just the one in flight at the moment `cancel()` was called. Shielded
//! scopes run their own cleanup against a detached token so they can finish
//! an in-flight await even while the parent scope is cancelled, then the
//! caller is responsible for re-propagating the outer cancellation.

use crate::error::{PynectorError, TimeoutError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A node in the cancel-scope tree.
///
/// Cloning a `CancelScope` shares the same underlying token; `child()`
/// derives a new scope whose cancellation is independent in one direction
/// only — cancelling the child never cancels the parent, but cancelling the
/// parent always cancels the child (and all of its descendants).
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancellationToken,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelScope {
    /// Create a new, unlinked root scope.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Derive a child scope. Cancelling the parent cancels this child;
    /// cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Cancel this scope and every descendant derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this scope has observed cancellation (state, not edge).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Suspend until this scope is cancelled. A suspension point per §5.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Run `cleanup` detached from this scope's cancellation — i.e. shielded.
    ///
    /// The shielded future still runs to completion even if this scope is
    /// already (or becomes) cancelled. Callers that catch a cancellation,
    /// need to await some cleanup, and then must re-raise per §4.7/§9
    /// should call this, await the result, and then propagate whatever
    /// cancellation signal they originally observed.
    pub async fn shielded<F, T>(&self, cleanup: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        cleanup.await
    }

    /// The raw token, for integrating with other tokio-util-based code.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// The outcome of racing a future against a deadline via [`move_on_after`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The future completed before the deadline.
    Completed(T),
    /// The deadline fired first.
    TimedOut,
}

impl<T> Outcome<T> {
    /// Whether the deadline fired.
    pub fn timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut)
    }

    /// The completed value, if any.
    pub fn into_completed(self) -> Option<T> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::TimedOut => None,
        }
    }
}

/// Race `fut` against a `d`-second deadline and an (optional) outer cancel
/// scope. Swallows the deadline into [`Outcome::TimedOut`] rather than
/// raising — the "exposes a flag" form from §4.7.
pub async fn move_on_after<F, T>(d: Duration, scope: &CancelScope, fut: F) -> Outcome<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = scope.cancelled() => Outcome::TimedOut,
        _ = tokio::time::sleep(d) => Outcome::TimedOut,
        value = fut => Outcome::Completed(value),
    }
}

/// Race `fut` against a `d`-second deadline, raising [`TimeoutError`] (wrapped
/// in [`PynectorError`]) if the deadline fires first — the "converts to
/// TimeoutError" form from §4.7.
pub async fn fail_after<F, T>(
    d: Duration,
    scope: &CancelScope,
    fut: F,
) -> Result<T, PynectorError>
where
    F: std::future::Future<Output = T>,
{
    let started = tokio::time::Instant::now();
    match move_on_after(d, scope, fut).await {
        Outcome::Completed(value) => Ok(value),
        Outcome::TimedOut => {
            if scope.is_cancelled() {
                Err(PynectorError::Cancelled)
            } else {
                Err(PynectorError::Timeout(TimeoutError::new(started.elapsed())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_child_cancelled_by_parent() {
        let parent = CancelScope::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_affect_parent() {
        let parent = CancelScope::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_move_on_after_completes_before_deadline() {
        let scope = CancelScope::new();
        let outcome = move_on_after(Duration::from_millis(200), &scope, async { 42 }).await;
        assert_eq!(outcome, Outcome::Completed(42));
    }

    #[tokio::test]
    async fn test_move_on_after_times_out() {
        let scope = CancelScope::new();
        let outcome = move_on_after(Duration::from_millis(10), &scope, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        })
        .await;
        assert!(outcome.timed_out());
    }

    #[tokio::test]
    async fn test_fail_after_raises_timeout_error() {
        let scope = CancelScope::new();
        let result: Result<i32, _> = fail_after(Duration::from_millis(10), &scope, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        })
        .await;
        assert!(matches!(result, Err(PynectorError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fail_after_surfaces_cancellation_not_timeout() {
        let scope = CancelScope::new();
        let scope_clone = scope.clone();
        let cancelled_seen = Arc::new(AtomicBool::new(false));
        let seen = cancelled_seen.clone();

        let fut = async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            seen.store(true, Ordering::SeqCst);
        };

        // Cancel promptly, well before the 5s deadline.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            scope_clone.cancel();
        });

        let result = fail_after(Duration::from_secs(5), &scope, fut).await;
        assert!(matches!(result, Err(PynectorError::Cancelled)));
        assert!(!cancelled_seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shielded_cleanup_runs_to_completion() {
        let scope = CancelScope::new();
        scope.cancel();
        // Even though the scope is already cancelled, shielded cleanup runs.
        let value = scope
            .shielded(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                "cleaned up"
            })
            .await;
        assert_eq!(value, "cleaned up");
        // The outer cancellation is still observable afterward.
        assert!(scope.is_cancelled());
    }
}
