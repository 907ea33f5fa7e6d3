//! Lock, Semaphore, Event, and Condition primitives (§4.7).
//!
//! Thin, intention-revealing wrappers over `tokio::sync` types rather than
//! new mechanisms — the point of naming them separately from raw tokio is
//! that call sites read as structured-concurrency vocabulary instead of
//! runtime plumbing.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex as TokioMutex, MutexGuard as TokioMutexGuard, Notify, Semaphore as TokioSemaphore, SemaphorePermit};

/// A mutual-exclusion lock, reentrant by the same task. Unlike
/// `std::sync::Mutex`, `lock()` is an async suspension point rather than a
/// blocking call, so it is safe to hold across an `.await` without starving
/// the executor.
///
/// Reentrancy is tracked via a holder task id compared against
/// `tokio::task::id()`: a nested `lock()` call from the task that already
/// holds the lock increments a depth counter instead of deadlocking against
/// itself, and the guard only releases the real gate once the outermost
/// nested guard drops.
pub struct Lock<T> {
    data: UnsafeCell<T>,
    gate: TokioMutex<()>,
    holder: StdMutex<Option<(tokio::task::Id, usize)>>,
}

// SAFETY: `data` is only ever accessed while `gate` is held by the current
// task (either directly, or transitively through a reentrant nested guard
// whose outer guard holds it) — a single tokio task never runs two of its
// own futures concurrently, so two `LockGuard`s for the same task never
// observe `data` at the same time as a third, unrelated task's guard.
unsafe impl<T: Send> Sync for Lock<T> {}

impl<T> Lock<T> {
    /// Wrap a value behind the lock.
    pub fn new(value: T) -> Self {
        Self {
            data: UnsafeCell::new(value),
            gate: TokioMutex::new(()),
            holder: StdMutex::new(None),
        }
    }

    /// Acquire the lock, suspending until it is free. Returns immediately
    /// (incrementing a depth counter rather than suspending) if the calling
    /// task already holds it.
    pub async fn lock(&self) -> LockGuard<'_, T> {
        let current = tokio::task::id();
        {
            let mut holder = self.holder.lock().expect("lock holder mutex poisoned");
            if let Some((held, depth)) = holder.as_mut() {
                if *held == current {
                    *depth += 1;
                    return LockGuard {
                        lock: self,
                        _gate: None,
                    };
                }
            }
        }

        let gate = self.gate.lock().await;
        *self.holder.lock().expect("lock holder mutex poisoned") = Some((current, 1));
        LockGuard {
            lock: self,
            _gate: Some(gate),
        }
    }
}

/// Guard returned by [`Lock::lock`]. A nested (reentrant) guard holds no
/// real gate permit; only the outermost guard's drop releases it.
pub struct LockGuard<'a, T> {
    lock: &'a Lock<T>,
    _gate: Option<TokioMutexGuard<'a, ()>>,
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: see `Lock`'s `Sync` impl rationale above.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Lock`'s `Sync` impl rationale above.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        let mut holder = self.lock.holder.lock().expect("lock holder mutex poisoned");
        if let Some((_, depth)) = holder.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *holder = None;
            }
        }
    }
}

/// A counting semaphore distinct from [`super::CapacityLimiter`]: this one
/// models the general §4.7 primitive (acquire/release by count), while
/// `CapacityLimiter` is the specific "bound concurrent transport calls"
/// application of it.
pub struct Semaphore {
    inner: TokioSemaphore,
}

impl Semaphore {
    /// Create a semaphore with `permits` initial units.
    pub fn new(permits: usize) -> Self {
        Self {
            inner: TokioSemaphore::new(permits),
        }
    }

    /// Acquire one unit, suspending until available.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.inner
            .acquire()
            .await
            .expect("Semaphore is never closed")
    }

    /// Units currently available.
    pub fn available_permits(&self) -> usize {
        self.inner.available_permits()
    }

    /// Add `n` units back to the semaphore (e.g. to model a resizable pool).
    pub fn add_permits(&self, n: usize) {
        self.inner.add_permits(n);
    }
}

/// A one-shot latch: `wait()` returns immediately once `set()` has been
/// called, whether that happened before or after the call to `wait()`.
///
/// `Notify` alone only wakes tasks already waiting at the moment `notify_*`
/// fires, which loses a "set then wait" race; the `AtomicBool` latch makes
/// `set()` sticky the way an Event is specified to behave.
pub struct Event {
    notify: Notify,
    set: AtomicBool,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// Create an unset event.
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            set: AtomicBool::new(false),
        }
    }

    /// Mark the event set and wake every current and future waiter.
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether `set()` has been called.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Suspend until the event is set. Returns immediately if already set.
    pub async fn wait(&self) {
        if self.is_set() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_set() {
            return;
        }
        notified.await;
    }
}

/// A condition variable paired with its own [`Lock`]: `wait` releases the
/// lock while suspended and reacquires it before returning, mirroring the
/// classic monitor pattern.
pub struct Condition<T> {
    lock: Lock<T>,
    notify: Notify,
}

impl<T> Condition<T> {
    /// Wrap a value with an associated condition variable.
    pub fn new(value: T) -> Self {
        Self {
            lock: Lock::new(value),
            notify: Notify::new(),
        }
    }

    /// Acquire the guarded state.
    pub async fn lock(&self) -> LockGuard<'_, T> {
        self.lock.lock().await
    }

    /// Release `guard`, suspend until notified, then reacquire the lock.
    pub async fn wait<'a>(&'a self, guard: LockGuard<'a, T>) -> LockGuard<'a, T> {
        let notified = self.notify.notified();
        drop(guard);
        notified.await;
        self.lock.lock().await
    }

    /// Wake one waiter.
    pub fn notify_one(&self) {
        self.notify.notify_one();
    }

    /// Wake every waiter.
    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }
}
