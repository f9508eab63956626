use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use super::recover;

/// A counting semaphore limiting concurrent access to a set of permits.
///
/// Permits are not tied to a guard; every successful acquire must be paired
/// with a [`release`](Semaphore::release).
///
/// # Examples
///
/// ```
/// use threadkit::Semaphore;
///
/// let semaphore = Semaphore::new(1);
///
/// semaphore.acquire();
/// assert!(!semaphore.try_acquire());
///
/// semaphore.release();
/// assert!(semaphore.try_acquire());
/// ```
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cvar: Condvar,
}

impl Semaphore {
    /// Create a new semaphore holding the given number of permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cvar: Condvar::new(),
        }
    }

    /// Block the current thread until a permit is available and take it.
    pub fn acquire(&self) {
        let mut permits = recover(self.permits.lock());

        while *permits == 0 {
            permits = recover(self.cvar.wait(permits));
        }

        *permits -= 1;
    }

    /// Block until a permit is available or the timeout elapses.
    ///
    /// Returns `true` if a permit was taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = recover(self.permits.lock());

        while *permits == 0 {
            match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if remaining > Duration::ZERO => {
                    permits = recover(self.cvar.wait_timeout(permits, remaining)).0;
                }
                _ => return false,
            }
        }

        *permits -= 1;
        true
    }

    /// Take a permit if one is immediately available.
    pub fn try_acquire(&self) -> bool {
        let mut permits = recover(self.permits.lock());

        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Return a permit to the semaphore, waking one blocked acquirer.
    pub fn release(&self) {
        self.release_n(1);
    }

    /// Return several permits to the semaphore at once.
    pub fn release_n(&self, n: usize) {
        if n == 0 {
            return;
        }

        let mut permits = recover(self.permits.lock());
        *permits = permits.saturating_add(n);
        drop(permits);

        if n == 1 {
            self.cvar.notify_one();
        } else {
            self.cvar.notify_all();
        }
    }

    /// Get the number of permits currently available.
    pub fn available_permits(&self) -> usize {
        *recover(self.permits.lock())
    }
}
