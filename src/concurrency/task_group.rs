//! `TaskGroup`: structured concurrency's nursery (§4.7).
//!
//! All children are spawned against the same [`CancellationToken`]; the
//! first child to fail cancels the token so its siblings observe
//! cancellation at their next suspension point — the same
//! check-before-and-after-every-sleep cancellation discipline a single
//! in-flight retry loop uses, now applied across a set of concurrently
//! spawned ones.

use super::CancelScope;
use std::fmt;
use tokio::task::JoinSet;

/// Raised by [`TaskGroup::join`] when one or more children failed.
///
/// Carries every child failure, not just the first — joining is a barrier,
/// so by the time it returns every child has already run to completion, been
/// cancelled, or panicked, and none of that information should be discarded.
#[derive(Debug)]
pub struct TaskGroupError {
    /// One entry per child task that did not complete successfully.
    pub failures: Vec<ChildFailure>,
}

/// Why a single child of a [`TaskGroup`] did not complete successfully.
#[derive(Debug)]
pub enum ChildFailure {
    /// The child's future returned `Err`.
    Failed(crate::error::PynectorError),
    /// The child was cancelled before completing.
    Cancelled,
    /// The child's task panicked.
    Panicked(String),
}

impl fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildFailure::Failed(e) => write!(f, "{e}"),
            ChildFailure::Cancelled => write!(f, "cancelled"),
            ChildFailure::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

impl fmt::Display for TaskGroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} tasks failed: ", self.failures.len(), self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskGroupError {}

/// A nursery of concurrently running child tasks sharing one cancel scope.
///
/// Spawn children with [`TaskGroup::spawn`]; call [`TaskGroup::join`] to wait
/// for all of them and collect any failures. The first child to return
/// `Err` (or panic) cancels the group's scope, so well-behaved siblings that
/// check `scope.cancelled()` unwind promptly instead of running to
/// completion after the group has already failed.
pub struct TaskGroup {
    scope: CancelScope,
    set: JoinSet<Result<(), crate::error::PynectorError>>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    /// Create an empty group with a fresh cancel scope.
    pub fn new() -> Self {
        Self {
            scope: CancelScope::new(),
            set: JoinSet::new(),
        }
    }

    /// Create a group whose scope is a child of `parent` — cancelling
    /// `parent` cancels this group too.
    pub fn with_parent_scope(parent: &CancelScope) -> Self {
        Self {
            scope: parent.child(),
            set: JoinSet::new(),
        }
    }

    /// The scope shared by every child spawned into this group.
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Spawn a child task. `f` receives the group's scope so it can check
    /// for cancellation at its own suspension points.
    pub fn spawn<F, Fut>(&mut self, f: F)
    where
        F: FnOnce(CancelScope) -> Fut,
        Fut: std::future::Future<Output = Result<(), crate::error::PynectorError>> + Send + 'static,
    {
        let child_scope = self.scope.child();
        let fut = f(child_scope);
        self.set.spawn(fut);
    }

    /// Await every spawned child. Cancels the group's scope on the first
    /// failure or panic so remaining siblings unwind early, then waits for
    /// all of them to actually finish before returning.
    ///
    /// Returns `Ok(())` if every child succeeded, or `Err(TaskGroupError)`
    /// listing every child that did not.
    pub async fn join(mut self) -> Result<(), TaskGroupError> {
        let mut failures = Vec::new();

        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(crate::error::PynectorError::Cancelled)) => {
                    failures.push(ChildFailure::Cancelled);
                }
                Ok(Err(e)) => {
                    self.scope.cancel();
                    failures.push(ChildFailure::Failed(e));
                }
                Err(join_err) => {
                    self.scope.cancel();
                    if join_err.is_cancelled() {
                        failures.push(ChildFailure::Cancelled);
                    } else {
                        failures.push(ChildFailure::Panicked(join_err.to_string()));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TaskGroupError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PynectorError;

    #[tokio::test]
    async fn test_all_children_succeed() {
        let mut group = TaskGroup::new();
        for _ in 0..3 {
            group.spawn(|_scope| async { Ok(()) });
        }
        assert!(group.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_one_failure_is_reported() {
        let mut group = TaskGroup::new();
        group.spawn(|_scope| async { Ok(()) });
        group.spawn(|_scope| async { Err(PynectorError::Other("boom".into())) });
        let err = group.join().await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_cancels_sibling_scope() {
        let mut group = TaskGroup::new();
        let scope = group.scope().clone();
        group.spawn(|_scope| async { Err(PynectorError::Other("boom".into())) });
        group.spawn(move |child_scope| async move {
            child_scope.cancelled().await;
            Err(PynectorError::Cancelled)
        });
        let err = group.join().await.unwrap_err();
        assert!(scope.is_cancelled());
        assert_eq!(err.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let mut group = TaskGroup::new();
        group.spawn(|_scope| async {
            panic!("child panicked");
            #[allow(unreachable_code)]
            Ok(())
        });
        let err = group.join().await.unwrap_err();
        assert!(matches!(err.failures[0], ChildFailure::Panicked(_)));
    }

    #[tokio::test]
    async fn test_with_parent_scope_propagates_cancellation() {
        let parent = CancelScope::new();
        let group = TaskGroup::with_parent_scope(&parent);
        assert!(!group.scope().is_cancelled());
        parent.cancel();
        assert!(group.scope().is_cancelled());
    }
}
