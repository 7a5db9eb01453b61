//! Counting semaphore used as the mutex allocator's lock

use parking_lot::{Condvar, Mutex};

/// Counting semaphore with a ceiling
///
/// `wait` blocks without a timeout. A thread that waits twice on a `(1, 1)`
/// semaphore deadlocks.
pub struct Semaphore {
    count: Mutex<u32>,
    max: u32,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` permits out of `max`
    pub fn new(initial: u32, max: u32) -> Self {
        assert!(max > 0 && initial <= max, "invalid semaphore counts {}/{}", initial, max);
        Self {
            count: Mutex::new(initial),
            max,
            available: Condvar::new(),
        }
    }

    /// Binary semaphore, initially free
    pub fn binary() -> Self {
        Self::new(1, 1)
    }

    /// Take a permit, blocking until one is available
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    /// Take a permit if one is available right now
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Return a permit; extra releases past the ceiling are dropped
    pub fn release(&self) {
        let mut count = self.count.lock();
        if *count < self.max {
            *count += 1;
            self.available.notify_one();
        }
    }

    /// Take a permit for the lifetime of the returned guard
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        self.wait();
        SemaphoreGuard { semaphore: self }
    }

    /// Permits currently available
    pub fn available(&self) -> u32 {
        *self.count.lock()
    }
}

/// Releases its permit on drop
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
