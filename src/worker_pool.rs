//! A minimal fixed-size pool built on a lock-protected queue.

use std::{
    collections::VecDeque,
    fmt,
    io,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use crate::{
    error::{Error, Result, TaskError},
    future::Future,
    pool::default_pool_size,
    sync::recover,
    task::Runnable,
};

/// A fixed number of worker threads pulling tasks from one FIFO queue.
///
/// This is the simpler sibling of [`ThreadPool`](crate::ThreadPool): it only
/// supports graceful shutdown and keeps no statistics.
///
/// # Examples
///
/// ```
/// use threadkit::WorkerPool;
///
/// let pool = WorkerPool::new(4).unwrap();
///
/// let futures: Vec<_> = (1..=4).map(|i| pool.submit(move || i)).collect();
/// let sum: i32 = futures.iter().map(|f| f.get().unwrap()).sum();
///
/// assert_eq!(sum, 10);
/// ```
pub struct WorkerPool {
    size: usize,
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

struct Queue {
    tasks: VecDeque<Runnable>,
    shutdown: bool,
}

impl WorkerPool {
    /// Create a pool with `size` worker threads.
    ///
    /// Returns [`Error::InvalidArgument`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::invalid_argument("worker pool size must be positive"));
        }

        Ok(Self::new_unchecked(size))
    }

    /// Create a pool with one worker per available CPU core.
    pub fn with_default_size() -> Self {
        Self::new_unchecked(default_pool_size())
    }

    fn new_unchecked(size: usize) -> Self {
        let shared = Arc::new(Shared::new());

        let handles = Shared::spawn_workers(&shared, size, |index, shared| {
            thread::Builder::new()
                .name(format!("worker-pool-{}", index))
                .spawn(move || shared.run_worker())
        })
        .unwrap_or_else(|e| panic!("failed to spawn worker pool thread: {}", e));

        Self {
            size,
            shared,
            handles,
        }
    }

    /// Get the fixed number of worker threads.
    pub fn pool_size(&self) -> usize {
        self.size
    }

    /// Get the number of tasks waiting to be picked up by a worker.
    pub fn queued_tasks(&self) -> usize {
        self.shared.lock_queue().tasks.len()
    }

    /// Check whether [`shutdown`](WorkerPool::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.lock_queue().shutdown
    }

    /// Queue a side-effecting task. Dropped silently after shutdown.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.push(Runnable::detached(task)).is_err() {
            log::debug!("worker pool is shut down, dropping task");
        }
    }

    /// Queue a task and return a future for its result.
    ///
    /// After shutdown the returned future has already failed with
    /// [`TaskError::Rejected`].
    pub fn submit<T, F>(&self, task: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (future, runnable) = Runnable::with_future(task);

        match self.shared.push(runnable) {
            Ok(()) => future,
            Err(_) => Future::failed(TaskError::Rejected),
        }
    }

    /// Stop accepting new tasks. Tasks already queued still run.
    pub fn shutdown(&self) {
        self.shared.close();
    }

    /// Shut down the pool and block until every worker thread has exited.
    pub fn join(mut self) {
        self.shutdown();

        for handle in self.handles.drain(..) {
            // Task panics are caught inside the worker, so a worker can only
            // fail to join if the runtime itself is broken.
            if handle.join().is_err() {
                log::warn!("worker pool thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pool_size", &self.size)
            .field("queued_tasks", &self.queued_tasks())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Start `size` workers through `spawn`. If a spawn fails, the workers
    /// already started are shut down and joined before the error is returned.
    fn spawn_workers<S>(shared: &Arc<Self>, size: usize, mut spawn: S) -> io::Result<Vec<JoinHandle<()>>>
    where
        S: FnMut(usize, Arc<Self>) -> io::Result<JoinHandle<()>>,
    {
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            match spawn(index, shared.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.close();

                    for handle in handles {
                        let _ = handle.join();
                    }

                    return Err(e);
                }
            }
        }

        Ok(handles)
    }

    fn close(&self) {
        let mut queue = self.lock_queue();

        if !queue.shutdown {
            log::debug!("worker pool shutting down with {} queued tasks", queue.tasks.len());
            queue.shutdown = true;
            self.available.notify_all();
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        recover(self.queue.lock())
    }

    fn push(&self, runnable: Runnable) -> std::result::Result<(), Runnable> {
        let mut queue = self.lock_queue();

        if queue.shutdown {
            return Err(runnable);
        }

        queue.tasks.push_back(runnable);
        drop(queue);

        self.available.notify_one();

        Ok(())
    }

    fn run_worker(&self) {
        log::trace!("worker pool thread started");

        loop {
            let mut queue = self.lock_queue();

            while queue.tasks.is_empty() && !queue.shutdown {
                queue = recover(self.available.wait(queue));
            }

            match queue.tasks.pop_front() {
                Some(runnable) => {
                    drop(queue);
                    runnable.run();
                }
                // Empty and shut down.
                None => break,
            }
        }

        log::trace!("worker pool thread exiting");
    }
}
