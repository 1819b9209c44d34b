use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore.
///
/// Bounds the number of jobs executing concurrently on the worker pool.
pub struct Semaphore {
    slots: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(slots: usize) -> Self {
        assert!(slots > 0, "slots must be > 0");
        Self {
            slots: Mutex::new(slots),
            cv: Condvar::new(),
        }
    }

    /// Acquire one slot, blocking until available.
    ///
    /// Returns the time spent waiting (zero if no wait was required).
    pub fn acquire(&self) -> Duration {
        let start = Instant::now();
        let mut waited = false;
        let mut guard = self.slots.lock().expect("semaphore mutex poisoned");
        while *guard == 0 {
            waited = true;
            guard = self.cv.wait(guard).expect("semaphore mutex poisoned");
        }
        *guard -= 1;
        if waited { start.elapsed() } else { Duration::ZERO }
    }

    /// Release one slot.
    pub fn release(&self) {
        let mut guard = self.slots.lock().expect("semaphore mutex poisoned");
        *guard += 1;
        self.cv.notify_one();
    }
}
