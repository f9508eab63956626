use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use super::recover;

/// A one-shot gate that opens once a counter has been counted down to zero.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use threadkit::CountDownLatch;
///
/// let latch = CountDownLatch::new(1);
/// assert!(!latch.await_timeout(Duration::ZERO));
///
/// latch.count_down();
/// assert!(latch.await_timeout(Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    cvar: Condvar,
}

impl CountDownLatch {
    /// Create a latch that opens after `count` calls to
    /// [`count_down`](CountDownLatch::count_down).
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            cvar: Condvar::new(),
        }
    }

    /// Decrement the count, waking all waiters if it reaches zero. Counting
    /// down an open latch has no effect.
    pub fn count_down(&self) {
        let mut count = recover(self.count.lock());

        if *count == 0 {
            return;
        }

        *count -= 1;

        if *count == 0 {
            self.cvar.notify_all();
        }
    }

    /// Block the current thread until the count reaches zero.
    pub fn wait(&self) {
        let mut count = recover(self.count.lock());

        while *count > 0 {
            count = recover(self.cvar.wait(count));
        }
    }

    /// Block until the count reaches zero or the timeout elapses.
    ///
    /// Returns `true` if the count reached zero before the deadline.
    pub fn await_timeout(&self, timeout: Duration) -> bool {
        self.await_deadline(Instant::now() + timeout)
    }

    /// Block until the count reaches zero or the deadline passes.
    pub fn await_deadline(&self, deadline: Instant) -> bool {
        let mut count = recover(self.count.lock());

        while *count > 0 {
            match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if remaining > Duration::ZERO => {
                    count = recover(self.cvar.wait_timeout(count, remaining)).0;
                }
                _ => return false,
            }
        }

        true
    }

    /// Get a snapshot of the current count.
    pub fn count(&self) -> usize {
        *recover(self.count.lock())
    }
}
