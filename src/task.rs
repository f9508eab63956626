use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
};

use crate::future::Future;

/// A unit of work queued in a pool, moved by value into the queue and then
/// into whichever worker picks it up.
///
/// Dropping a runnable without running it drops whatever promise it owns, which
/// resolves the corresponding future to the discarded state.
pub(crate) struct Runnable(Box<dyn FnOnce() -> bool + Send>);

impl Runnable {
    /// Create a runnable for a fire-and-forget closure. Panics are caught and
    /// logged since nobody is waiting for the result.
    pub(crate) fn detached<F>(closure: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(move || match catch_unwind(AssertUnwindSafe(closure)) {
            Ok(()) => false,
            Err(payload) => {
                log::warn!("detached task panicked: {}", panic_message(&*payload));
                true
            }
        }))
    }

    /// Create a runnable for a closure whose result is delivered through a
    /// future.
    pub(crate) fn with_future<T, F>(closure: F) -> (Future<T>, Self)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (future, promise) = Future::pending();

        (future, Self(Box::new(move || promise.complete(closure))))
    }

    /// Run the task to completion on the current thread.
    ///
    /// Returns `true` if the task panicked.
    pub(crate) fn run(self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Runnable(..)")
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("Box<dyn Any>")
    }
}
