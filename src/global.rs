//! The process-wide shared thread pool.
//!
//! The global pool is created lazily on first use and lives until the process
//! exits. It is never torn down; calling [`ThreadPool::shutdown`] on it affects
//! every user of the pool for the remainder of the process.

use once_cell::sync::OnceCell;

use crate::{
    error::{Error, Result},
    pool::{Builder, ThreadPool},
};

static GLOBAL: OnceCell<ThreadPool> = OnceCell::new();

/// Get a shared reference to the global thread pool for the entire process.
///
/// Concurrent first calls race safely; exactly one pool is ever created.
///
/// # Examples
///
/// ```
/// let result = threadkit::global().submit(|| 2 + 2).get();
///
/// assert_eq!(result, Ok(4));
/// ```
pub fn global() -> &'static ThreadPool {
    GLOBAL.get_or_init(|| global_builder().build_unchecked())
}

/// Configure the global thread pool.
///
/// This should be done near the start of your program before any other code
/// uses the global pool, as this function will return
/// [`Error::GlobalAlreadyInitialized`] if the pool already exists.
///
/// Only programs should use this function! Libraries should not use this
/// function and instead allow the running program to configure the global pool.
/// If you need a customized pool in a library then you should use a separate
/// pool instance.
///
/// # Examples
///
/// ```
/// threadkit::configure_global(|builder| builder.size(3)).unwrap();
///
/// assert_eq!(threadkit::global().pool_size(), 3);
/// ```
pub fn configure_global<F>(f: F) -> Result<()>
where
    F: FnOnce(Builder) -> Builder,
{
    let mut was_initialized = true;

    GLOBAL.get_or_try_init(|| {
        was_initialized = false;
        f(global_builder()).build()
    })?;

    if was_initialized {
        Err(Error::GlobalAlreadyInitialized)
    } else {
        Ok(())
    }
}

/// Run a fire-and-forget task on the global thread pool.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use threadkit::WaitGroup;
///
/// let wg = Arc::new(WaitGroup::new());
/// wg.add(1);
///
/// let done = wg.clone();
/// threadkit::go(move || done.done());
///
/// wg.wait();
/// ```
pub fn go<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    global().execute(task);
}

fn global_builder() -> Builder {
    Builder::default().name("global-pool")
}
