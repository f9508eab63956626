//! Single-assignment result cells shared between one writer and many readers.

use std::{
    fmt,
    future::Future as StdFuture,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};

use atomic_waker::AtomicWaker;

use crate::{
    error::TaskError,
    sync::{recover, CountDownLatch},
    task::panic_message,
};

/// The observable state of a [`Future`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FutureState {
    /// The result has not been produced yet.
    Pending,

    /// The result was produced successfully.
    Succeeded,

    /// The computation failed; the future carries a [`TaskError`].
    Failed,
}

/// A handle to a result produced asynchronously, usually by a task running in
/// a thread pool.
///
/// A future starts out pending and is resolved exactly once, either to a value
/// or to a [`TaskError`]. Futures can be cloned freely; every clone observes
/// the same terminal result.
///
/// Results are read by cloning them out of the future, so reading requires
/// `T: Clone`. Futures also implement [`std::future::Future`] and can be
/// `.await`ed from asynchronous code.
///
/// # Examples
///
/// ```
/// use threadkit::{Future, TaskError};
///
/// let (future, promise) = Future::pending();
/// assert!(!future.is_done());
///
/// promise.succeed(42);
/// assert_eq!(future.get(), Ok(42));
///
/// let failed: Future<i32> = Future::failed(TaskError::Rejected);
/// assert_eq!(failed.get().unwrap_err().to_string(), "pool is shut down");
/// ```
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    done: CountDownLatch,
    waker: AtomicWaker,
}

enum State<T> {
    Pending,
    Succeeded(T),
    Failed(TaskError),
}

impl<T> Future<T> {
    /// Create a pending future together with the promise used to resolve it.
    pub fn pending() -> (Self, Promise<T>) {
        let inner = Arc::new(Inner {
            state: Mutex::new(State::Pending),
            done: CountDownLatch::new(1),
            waker: AtomicWaker::new(),
        });

        let promise = Promise {
            inner: Some(inner.clone()),
        };

        (Self { inner }, promise)
    }

    /// Create a future that has already succeeded with the given value.
    pub fn succeeded(value: T) -> Self {
        let (future, promise) = Self::pending();
        promise.succeed(value);
        future
    }

    /// Create a future that has already failed with the given error.
    pub fn failed(error: TaskError) -> Self {
        let (future, promise) = Self::pending();
        promise.resolve(Err(error));
        future
    }

    /// Check whether the future has reached a terminal state without blocking.
    pub fn is_done(&self) -> bool {
        self.state() != FutureState::Pending
    }

    /// Get the current state of the future without blocking.
    pub fn state(&self) -> FutureState {
        match &*recover(self.inner.state.lock()) {
            State::Pending => FutureState::Pending,
            State::Succeeded(_) => FutureState::Succeeded,
            State::Failed(_) => FutureState::Failed,
        }
    }

    /// Block the current thread until the future reaches a terminal state.
    pub fn wait(&self) {
        self.inner.done.wait();
    }

    /// Block until the future reaches a terminal state or the timeout elapses.
    ///
    /// Returns `true` if the future is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.done.await_timeout(timeout)
    }
}

impl<T: Clone> Future<T> {
    /// Block the current thread until the future is resolved and return its
    /// result.
    pub fn get(&self) -> Result<T, TaskError> {
        self.wait();

        // Cannot be pending once the latch has opened.
        self.try_get().unwrap_or(Err(TaskError::Discarded))
    }

    /// Block until the future is resolved or the timeout elapses.
    ///
    /// Returns `None` if the future is still pending after the timeout.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<T, TaskError>> {
        if self.wait_timeout(timeout) {
            self.try_get()
        } else {
            None
        }
    }

    /// Get the result if the future has already been resolved.
    pub fn try_get(&self) -> Option<Result<T, TaskError>> {
        match &*recover(self.inner.state.lock()) {
            State::Pending => None,
            State::Succeeded(value) => Some(Ok(value.clone())),
            State::Failed(error) => Some(Err(error.clone())),
        }
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> StdFuture for Future<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.waker.register(cx.waker());

        match self.try_get() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("state", &self.state())
            .finish()
    }
}

/// The writing half of a [`Future`].
///
/// A promise is consumed when it resolves its future, so a future can be
/// resolved at most once. Dropping a promise without resolving it fails the
/// future with [`TaskError::Discarded`], so a future is never left pending
/// forever.
pub struct Promise<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Promise<T> {
    /// Resolve the future successfully with the given value.
    pub fn succeed(self, value: T) {
        self.resolve(Ok(value));
    }

    /// Fail the future with the given message.
    pub fn fail<M: Into<String>>(self, message: M) {
        self.resolve(Err(TaskError::Failed(message.into())));
    }

    /// Run a closure and resolve the future with its return value, or with
    /// [`TaskError::Panicked`] if it panics.
    ///
    /// Returns `true` if the closure panicked.
    pub(crate) fn complete<F>(self, f: F) -> bool
    where
        F: FnOnce() -> T,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                self.resolve(Ok(value));
                false
            }
            Err(payload) => {
                self.resolve(Err(TaskError::Panicked(panic_message(&*payload))));
                true
            }
        }
    }

    pub(crate) fn resolve(mut self, result: Result<T, TaskError>) {
        if let Some(inner) = self.inner.take() {
            inner.resolve(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            log::trace!("promise dropped before it was resolved, discarding");
            inner.resolve(Err(TaskError::Discarded));
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Promise(..)")
    }
}

impl<T> Inner<T> {
    fn resolve(&self, result: Result<T, TaskError>) {
        let mut state = recover(self.state.lock());

        if let State::Pending = *state {
            *state = match result {
                Ok(value) => State::Succeeded(value),
                Err(error) => State::Failed(error),
            };
        } else {
            return;
        }

        drop(state);

        self.done.count_down();
        self.waker.wake();
    }
}
