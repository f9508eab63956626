use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use super::recover;

/// Waits for a collection of operations to finish.
///
/// The owner calls [`add`](WaitGroup::add) with the number of operations to
/// wait for, each operation calls [`done`](WaitGroup::done) when finished, and
/// [`wait`](WaitGroup::wait) blocks until the counter drops back to zero.
///
/// Driving the counter below zero is a programming error. Rather than
/// panicking, the counter is floored at zero and the error is logged.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, thread};
/// use threadkit::WaitGroup;
///
/// let wg = Arc::new(WaitGroup::new());
/// wg.add(2);
///
/// for _ in 0..2 {
///     let wg = wg.clone();
///     thread::spawn(move || wg.done());
/// }
///
/// wg.wait();
/// assert_eq!(wg.count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct WaitGroup {
    counter: Mutex<usize>,
    cvar: Condvar,
}

impl WaitGroup {
    /// Create a new wait group with a counter of zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust the counter by `delta`, which may be negative.
    pub fn add(&self, delta: isize) {
        let mut counter = recover(self.counter.lock());

        if delta >= 0 {
            *counter = counter.saturating_add(delta as usize);
        } else {
            let decrement = delta.unsigned_abs();

            if decrement > *counter {
                log::error!(
                    "wait group counter would become negative ({} - {}), clamping to zero",
                    *counter,
                    decrement
                );
                *counter = 0;
            } else {
                *counter -= decrement;
            }
        }

        if *counter == 0 {
            self.cvar.notify_all();
        }
    }

    /// Mark one operation as finished. Equivalent to `add(-1)`.
    pub fn done(&self) {
        self.add(-1);
    }

    /// Block the current thread until the counter reaches zero.
    pub fn wait(&self) {
        let mut counter = recover(self.counter.lock());

        while *counter > 0 {
            counter = recover(self.cvar.wait(counter));
        }
    }

    /// Block until the counter reaches zero or the timeout elapses.
    ///
    /// Returns `true` if the counter reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counter = recover(self.counter.lock());

        while *counter > 0 {
            match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if remaining > Duration::ZERO => {
                    counter = recover(self.cvar.wait_timeout(counter, remaining)).0;
                }
                _ => return false,
            }
        }

        true
    }

    /// Get a snapshot of the current counter.
    pub fn count(&self) -> usize {
        *recover(self.counter.lock())
    }
}
