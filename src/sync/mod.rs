//! Blocking coordination primitives built on a lock and a condition variable.
//!
//! Every primitive here recovers from lock poisoning: a thread that panics
//! while holding one of the internal locks does not render the primitive
//! unusable for everyone else.

use std::sync::{LockResult, PoisonError};

mod latch;
mod mutex;
mod semaphore;
mod wait_group;

pub use self::{
    latch::CountDownLatch,
    mutex::{Mutex, MutexGuard},
    semaphore::Semaphore,
    wait_group::WaitGroup,
};

/// Unwrap a lock result, taking the guard back out of a poison error.
pub(crate) fn recover<G>(result: LockResult<G>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}
