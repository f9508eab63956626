use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{self, TryLockError},
};

use super::recover;

/// A mutual exclusion lock protecting a value of type `T`.
///
/// Unlike [`std::sync::Mutex`], this lock never reports poisoning. If a thread
/// panics while holding the lock, the lock is released during unwinding and
/// the next caller acquires it normally.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, thread};
/// use threadkit::Mutex;
///
/// let counter = Arc::new(Mutex::new(0));
///
/// let handles: Vec<_> = (0..2)
///     .map(|_| {
///         let counter = counter.clone();
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 counter.with_lock(|count| *count += 1);
///             }
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
///
/// assert_eq!(*counter.lock(), 2000);
/// ```
pub struct Mutex<T: ?Sized> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Create a new unlocked mutex holding the given value.
    pub fn new(value: T) -> Self {
        Self {
            inner: sync::Mutex::new(value),
        }
    }

    /// Consume the mutex, returning the protected value.
    pub fn into_inner(self) -> T {
        recover(self.inner.into_inner())
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Block the current thread until the lock is acquired.
    ///
    /// The lock is released when the returned guard is dropped or passed to
    /// [`MutexGuard::unlock`].
    pub fn lock(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            inner: recover(self.inner.lock()),
        }
    }

    /// Attempt to acquire the lock without blocking.
    ///
    /// Returns `None` if the lock is currently held by someone else.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(inner) => Some(MutexGuard { inner }),
            Err(TryLockError::Poisoned(e)) => Some(MutexGuard {
                inner: e.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Run a closure while holding the lock.
    ///
    /// The lock is released on every exit path of `body`, including when it
    /// panics.
    pub fn with_lock<R, F>(&self, body: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.lock();
        body(&mut *guard)
    }

    /// Get a mutable reference to the protected value. No locking is needed
    /// since the borrow checker guarantees exclusive access.
    pub fn get_mut(&mut self) -> &mut T {
        recover(self.inner.get_mut())
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Mutex").field("data", &&*guard).finish(),
            None => f.debug_struct("Mutex").field("data", &"<locked>").finish(),
        }
    }
}

/// Proof of holding a [`Mutex`]. Dereferences to the protected value.
pub struct MutexGuard<'a, T: ?Sized> {
    inner: sync::MutexGuard<'a, T>,
}

impl<T: ?Sized> MutexGuard<'_, T> {
    /// Release the lock explicitly. Equivalent to dropping the guard.
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
