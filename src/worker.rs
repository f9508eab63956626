use crossbeam_channel::Receiver;

use crate::task::Runnable;

/// A type which receives notifications from a worker.
pub(crate) trait Listener {
    fn on_task_started(&mut self) {}

    fn on_task_completed(&mut self, _panicked: bool) {}
}

/// A worker thread which belongs to a thread pool and executes tasks.
pub(crate) struct Worker<L: Listener> {
    /// Queue of new tasks to run. The worker exits once the queue has been
    /// closed and drained.
    queue: Receiver<Runnable>,

    /// Receiver of various worker events.
    listener: L,
}

impl<L: Listener> Worker<L> {
    pub(crate) fn new(queue: Receiver<Runnable>, listener: L) -> Self {
        Self { queue, listener }
    }

    pub(crate) fn run(mut self) {
        log::trace!("worker thread started");

        // Receiving fails only once every sender is gone and the queue is
        // empty, which is how the pool signals shutdown.
        while let Ok(runnable) = self.queue.recv() {
            self.listener.on_task_started();
            let panicked = runnable.run();
            self.listener.on_task_completed(panicked);
        }

        log::trace!("worker thread exiting");
    }
}
