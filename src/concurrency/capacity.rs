//! Bounded concurrency via a counting semaphore (§4.7).

use tokio::sync::{Semaphore, SemaphorePermit};

/// Bounds how many callers may hold a permit at once.
///
/// Acquiring blocks (cooperatively) once the limit is reached, and releases
/// automatically when the returned guard drops.
pub struct CapacityLimiter {
    semaphore: Semaphore,
    total: usize,
}

impl CapacityLimiter {
    /// Create a limiter allowing at most `total` concurrent holders.
    pub fn new(total: usize) -> Self {
        Self {
            semaphore: Semaphore::new(total),
            total,
        }
    }

    /// Total permits this limiter was constructed with.
    pub fn total_tokens(&self) -> usize {
        self.total
    }

    /// Permits currently available (not held).
    pub fn available_tokens(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire one permit, suspending until one is free.
    pub async fn acquire(&self) -> CapacityGuard<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("CapacityLimiter semaphore is never closed");
        CapacityGuard { permit }
    }

    /// Try to acquire a permit without suspending.
    pub fn try_acquire(&self) -> Option<CapacityGuard<'_>> {
        self.semaphore.try_acquire().ok().map(|permit| CapacityGuard { permit })
    }
}

/// Held while a caller occupies one of a [`CapacityLimiter`]'s slots.
/// Dropping it returns the permit.
pub struct CapacityGuard<'a> {
    #[allow(dead_code)]
    permit: SemaphorePermit<'a>,
}
