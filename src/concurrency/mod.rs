//! Structured concurrency core: task groups, cancel scopes, capacity limiter,
//! and the other synchronization primitives described in §4.7.
//!
//! The scheduling model spec.md describes as "a cooperative single-threaded
//! event loop" is realized on tokio's cooperative task scheduler: every
//! `.await` point is a potential suspension point, and cancellation is
//! propagated as state (a shared [`tokio_util::sync::CancellationToken`])
//! rather than by unwinding, so it can be observed at each subsequent
//! suspension point the way §9's Design Notes require on an edge-based
//! runtime.

mod cancel;
mod capacity;
mod sync;
mod task_group;

pub use cancel::{fail_after, move_on_after, CancelScope, Outcome};
pub use capacity::CapacityLimiter;
pub use sync::{Condition, Event, Lock, Semaphore};
pub use task_group::{TaskGroup, TaskGroupError};
