//! Implementation of the general-purpose thread pool.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;

use crate::{
    error::{Error, Result, TaskError},
    future::Future,
    sync::recover,
    task::Runnable,
    worker::{Listener, Worker},
};

#[cfg(target_has_atomic = "64")]
type AtomicCounter = std::sync::atomic::AtomicU64;

#[cfg(not(target_has_atomic = "64"))]
type AtomicCounter = std::sync::atomic::AtomicU32;

static CORE_COUNT: Lazy<usize> = Lazy::new(|| num_cpus::get().max(1));

/// Get the default number of worker threads for a pool, which is the number of
/// available CPU cores (at least one).
pub fn default_pool_size() -> usize {
    *CORE_COUNT
}

/// The lifecycle state of a [`ThreadPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    /// The pool accepts new tasks.
    Running,

    /// The pool rejects new tasks, but queued tasks are still being run.
    ShuttingDown,

    /// Every worker thread has exited.
    Terminated,
}

/// A builder for constructing a customized [`ThreadPool`].
///
/// # Examples
///
/// ```
/// let custom_pool = threadkit::ThreadPool::builder()
///     .name("my-pool")
///     .size(2)
///     .build()
///     .unwrap();
///
/// assert_eq!(custom_pool.pool_size(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    size: Option<usize>,
    stack_size: Option<usize>,
}

impl Builder {
    /// Set a custom thread name for threads spawned by this thread pool.
    ///
    /// A name containing null bytes (`\0`) is rejected by
    /// [`build`](Builder::build).
    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the fixed number of worker threads in this thread pool.
    ///
    /// If not set, one thread per available CPU core is used. A size of zero is
    /// rejected by [`build`](Builder::build).
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the size of the stack (in bytes) for threads in this thread pool.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// enforces a larger minimum stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Create a thread pool according to the configuration set with this
    /// builder.
    ///
    /// Returns [`Error::InvalidArgument`] if the configured size is zero or
    /// the thread name contains null bytes.
    pub fn build(self) -> Result<ThreadPool> {
        if self.size == Some(0) {
            return Err(Error::invalid_argument("thread pool size must be non-zero"));
        }

        if let Some(name) = self.name.as_ref() {
            if name.as_bytes().contains(&0) {
                return Err(Error::invalid_argument(
                    "thread pool name must not contain null bytes",
                ));
            }
        }

        Ok(self.build_unchecked())
    }

    /// Build the pool, assuming the configuration has already been validated.
    pub(crate) fn build_unchecked(self) -> ThreadPool {
        let size = self.size.unwrap_or_else(default_pool_size);
        let (sender, receiver) = unbounded();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                status: PoolState::Running,
                sender: Some(sender),
                thread_count: size,
            }),
            running_tasks_count: Default::default(),
            completed_tasks_count: Default::default(),
            panicked_tasks_count: Default::default(),
            termination_cvar: Condvar::new(),
        });

        for _ in 0..size {
            spawn_worker(
                self.name.as_deref(),
                self.stack_size,
                receiver.clone(),
                shared.clone(),
            );
        }

        ThreadPool {
            size,
            queue: receiver,
            shared,
        }
    }
}

/// A fixed-size thread pool returning a [`Future`] for every submitted task.
///
/// Tasks are placed on a single FIFO queue shared by every worker thread. With
/// more than one worker, tasks may complete in any order, but each task runs
/// exactly once.
///
/// Dropping the thread pool performs a graceful [`shutdown`](ThreadPool::shutdown)
/// and detaches the worker threads, which finish the queued work in the
/// background. Use [`join`](ThreadPool::join) or
/// [`await_termination`](ThreadPool::await_termination) to block until all
/// work is done.
///
/// # Monitoring
///
/// Each pool instance provides methods for gathering statistics on the pool's
/// usage, such as the number of running, queued and completed tasks. These
/// numbers may become outdated immediately and should not be used for
/// controlling program behavior.
pub struct ThreadPool {
    size: usize,
    queue: Receiver<Runnable>,
    shared: Arc<Shared>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Builder::default().build_unchecked()
    }
}

impl ThreadPool {
    /// Create a new thread pool with exactly `size` worker threads.
    ///
    /// Returns [`Error::InvalidArgument`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        Self::builder().size(size).build()
    }

    /// Get a builder for creating a customized thread pool.
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Get the fixed number of worker threads this pool was created with.
    pub fn pool_size(&self) -> usize {
        self.size
    }

    /// Get the number of worker threads currently alive.
    pub fn threads(&self) -> usize {
        self.shared.lock_state().thread_count
    }

    /// Get the number of tasks queued for execution, but not yet started.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::{thread::sleep, time::Duration};
    ///
    /// // Create a pool with just one thread.
    /// let pool = threadkit::ThreadPool::new(1).unwrap();
    ///
    /// // Start a slow task.
    /// pool.execute(|| sleep(Duration::from_millis(100)));
    ///
    /// // Wait a little for the task to start.
    /// sleep(Duration::from_millis(20));
    ///
    /// // Enqueue some more tasks.
    /// for _ in 0..4 {
    ///     pool.execute(|| {});
    /// }
    ///
    /// // The tasks should still be in the queue because the slow task is
    /// // running on the only thread.
    /// assert_eq!(pool.queued_tasks(), 4);
    /// # pool.join();
    /// ```
    #[inline]
    pub fn queued_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Get the number of tasks currently running.
    #[inline]
    pub fn running_tasks(&self) -> usize {
        self.shared.running_tasks_count.load(Ordering::Relaxed)
    }

    /// Get the number of tasks completed (successfully or otherwise) by this
    /// pool since it was created.
    #[inline]
    #[allow(clippy::useless_conversion)]
    pub fn completed_tasks(&self) -> u64 {
        self.shared.completed_tasks_count.load(Ordering::Relaxed).into()
    }

    /// Get the number of tasks that have panicked since the pool was created.
    #[inline]
    #[allow(clippy::useless_conversion)]
    pub fn panicked_tasks(&self) -> u64 {
        self.shared.panicked_tasks_count.load(Ordering::Relaxed).into()
    }

    /// Get the current lifecycle state of the pool.
    pub fn state(&self) -> PoolState {
        self.shared.lock_state().status
    }

    /// Check whether the pool has stopped accepting new tasks.
    pub fn is_shutdown(&self) -> bool {
        self.state() != PoolState::Running
    }

    /// Check whether every worker thread has exited.
    pub fn is_terminated(&self) -> bool {
        self.state() == PoolState::Terminated
    }

    /// Submit a closure to be executed by the thread pool, returning a future
    /// for its result.
    ///
    /// Submission never blocks. If the pool has been shut down, the returned
    /// future has already failed with [`TaskError::Rejected`]. If the closure
    /// panics, the future fails with [`TaskError::Panicked`].
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadkit::ThreadPool::new(2).unwrap();
    /// let future = pool.submit(|| {
    ///     2 + 2 // some expensive computation
    /// });
    ///
    /// // do something in the meantime
    ///
    /// // now wait for the result
    /// assert_eq!(future.get(), Ok(4));
    /// ```
    pub fn submit<T, F>(&self, task: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (future, runnable) = Runnable::with_future(task);

        match self.enqueue(runnable) {
            Ok(()) => future,
            Err(_) => Future::failed(TaskError::Rejected),
        }
    }

    /// Submit a closure to be executed by the thread pool without waiting for
    /// its result. If the pool has been shut down, the closure is silently
    /// dropped.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.enqueue(Runnable::detached(task)).is_err() {
            log::debug!("thread pool is shut down, dropping task");
        }
    }

    /// Submit every closure in `tasks`, returning their futures in the same
    /// order. Does not block waiting for the tasks to complete.
    pub fn invoke_all<T, F, I>(&self, tasks: I) -> Vec<Future<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        tasks.into_iter().map(|task| self.submit(task)).collect()
    }

    fn enqueue(&self, runnable: Runnable) -> std::result::Result<(), Runnable> {
        let state = self.shared.lock_state();

        match state.sender.as_ref() {
            // Sending to an unbounded channel never blocks, and cannot fail
            // while we hold the receiver ourselves.
            Some(sender) => sender.send(runnable).map_err(|e| e.into_inner()),
            None => Err(runnable),
        }
    }

    /// Stop accepting new tasks. Tasks already queued still run to completion.
    ///
    /// This does not block; use [`await_termination`](ThreadPool::await_termination)
    /// to wait for the queue to drain.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock_state();

        if state.status == PoolState::Running {
            log::debug!("thread pool shutting down");
            state.status = PoolState::ShuttingDown;

            // Closing the channel signals idle workers to exit once the
            // queue is empty.
            state.sender = None;
        }
    }

    /// Stop accepting new tasks and discard every queued task that has not
    /// started yet. Futures of discarded tasks fail with
    /// [`TaskError::Discarded`]. Running tasks are allowed to finish.
    ///
    /// Returns the number of discarded tasks.
    pub fn shutdown_now(&self) -> usize {
        let mut state = self.shared.lock_state();

        if state.status == PoolState::Running {
            state.status = PoolState::ShuttingDown;
            state.sender = None;
        }

        let discarded: Vec<Runnable> = self.queue.try_iter().collect();
        drop(state);

        let count = discarded.len();
        log::debug!("thread pool shut down forcibly, discarding {} queued tasks", count);

        // Dropping the runnables fails their futures.
        drop(discarded);

        count
    }

    /// Block until the pool has terminated or the timeout elapses.
    ///
    /// Returns `true` if the pool terminated before the timeout. This does not
    /// initiate a shutdown by itself.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.await_termination_internal(Some(Instant::now() + timeout))
    }

    fn await_termination_internal(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.shared.lock_state();

        while state.status != PoolState::Terminated {
            // If a deadline is set, figure out how much time is remaining and
            // wait for that amount.
            if let Some(deadline) = deadline {
                match deadline.checked_duration_since(Instant::now()) {
                    Some(timeout) if timeout > Duration::ZERO => {
                        state = recover(self.shared.termination_cvar.wait_timeout(state, timeout)).0;
                    }
                    _ => return false,
                }
            }
            // If a deadline is not set, wait forever.
            else {
                state = recover(self.shared.termination_cvar.wait(state));
            }
        }

        true
    }

    /// Shut down this thread pool and block until all queued tasks have
    /// completed and threads have stopped.
    pub fn join(self) {
        self.shutdown();
        self.await_termination_internal(None);
    }

    /// Shut down this thread pool and block until all queued tasks have
    /// completed and threads have stopped, or until the given timeout passes.
    ///
    /// Returns `true` if the thread pool shut down fully before the timeout.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        self.shutdown();
        self.await_termination(timeout)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("state", &self.state())
            .field("queued_tasks", &self.queued_tasks())
            .field("running_tasks", &self.running_tasks())
            .field("completed_tasks", &self.completed_tasks())
            .finish()
    }
}

/// Thread pool state shared by the owner and the worker threads.
struct Shared {
    state: Mutex<State>,
    running_tasks_count: AtomicUsize,
    completed_tasks_count: AtomicCounter,
    panicked_tasks_count: AtomicCounter,
    termination_cvar: Condvar,
}

/// Everything about the pool that changes on submission or shutdown, guarded
/// by a single lock.
struct State {
    status: PoolState,
    sender: Option<Sender<Runnable>>,
    thread_count: usize,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        recover(self.state.lock())
    }
}

/// Spawn a worker thread into the pool. The thread count must already include
/// this worker; it is decremented again when the worker exits.
fn spawn_worker(
    name: Option<&str>,
    stack_size: Option<usize>,
    queue: Receiver<Runnable>,
    shared: Arc<Shared>,
) {
    struct WorkerListener {
        shared: Arc<Shared>,
    }

    impl Listener for WorkerListener {
        fn on_task_started(&mut self) {
            self.shared
                .running_tasks_count
                .fetch_add(1, Ordering::Relaxed);
        }

        fn on_task_completed(&mut self, panicked: bool) {
            self.shared
                .running_tasks_count
                .fetch_sub(1, Ordering::Relaxed);
            self.shared
                .completed_tasks_count
                .fetch_add(1, Ordering::Relaxed);

            if panicked {
                self.shared
                    .panicked_tasks_count
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    impl Drop for WorkerListener {
        fn drop(&mut self) {
            let mut state = self.shared.lock_state();
            state.thread_count = state.thread_count.saturating_sub(1);

            if state.thread_count == 0 && state.status == PoolState::ShuttingDown {
                log::debug!("thread pool terminated");
                state.status = PoolState::Terminated;
                self.shared.termination_cvar.notify_all();
            }
        }
    }

    // Configure the thread based on the thread pool configuration.
    let mut builder = thread::Builder::new();

    if let Some(name) = name {
        builder = builder.name(name.to_owned());
    }

    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }

    let worker = Worker::new(queue, WorkerListener { shared });

    if let Err(e) = builder.spawn(move || worker.run()) {
        panic!("failed to spawn thread pool worker: {}", e);
    }
}
