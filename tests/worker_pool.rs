use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use threadkit::{CountDownLatch, Error, TaskError, WorkerPool};

#[test]
fn zero_size_is_rejected() {
    assert!(matches!(WorkerPool::new(0), Err(Error::InvalidArgument(_))));
}

#[test]
fn default_size_matches_core_count() {
    let pool = WorkerPool::with_default_size();

    assert!(pool.pool_size() >= 1);
    assert_eq!(pool.pool_size(), threadkit::default_pool_size());
    assert!(!pool.is_shutdown());

    assert_eq!(pool.submit(|| 7).get(), Ok(7));
    pool.join();
}

#[test]
fn submit_sums_results() {
    let pool = WorkerPool::new(4).unwrap();

    let futures: Vec<_> = (1..=4).map(|i| pool.submit(move || i)).collect();
    let sum: i32 = futures.iter().map(|future| future.get().unwrap()).sum();

    assert_eq!(sum, 10);
}

#[test]
fn submit_infers_result_types() {
    let pool = WorkerPool::new(2).unwrap();

    let number = pool.submit(|| 6 * 7);
    let text = pool.submit(|| String::from("text"));
    let flag = pool.submit(|| true);

    assert_eq!(number.get(), Ok(42));
    assert_eq!(text.get(), Ok(String::from("text")));
    assert_eq!(flag.get(), Ok(true));
}

#[test]
fn single_worker_runs_tasks_in_submission_order() {
    let pool = WorkerPool::new(1).unwrap();
    let order = Arc::new(threadkit::Mutex::new(Vec::new()));

    for i in 0..10 {
        let order = order.clone();
        pool.execute(move || order.with_lock(|order| order.push(i)));
    }

    pool.join();

    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn queued_tasks_finish_after_shutdown() {
    let pool = WorkerPool::new(1).unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let count = count.clone();
        pool.execute(move || {
            thread::sleep(Duration::from_millis(5));
            count.fetch_add(1, Ordering::SeqCst);
        });
    }

    pool.shutdown();
    assert!(pool.is_shutdown());

    pool.join();
    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn submissions_after_shutdown_are_rejected() {
    let pool = WorkerPool::new(2).unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    pool.shutdown();

    assert_eq!(pool.submit(|| 1).get(), Err(TaskError::Rejected));

    let counter = count.clone();
    pool.execute(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    pool.join();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_task_fails_its_future_and_pool_keeps_working() {
    let pool = WorkerPool::new(1).unwrap();

    let failed = pool.submit(|| -> i32 { panic!("oh no!") });
    assert_eq!(failed.get(), Err(TaskError::Panicked(String::from("oh no!"))));

    pool.execute(|| panic!("detached"));

    let latch = Arc::new(CountDownLatch::new(1));
    let signal = latch.clone();
    pool.execute(move || signal.count_down());

    assert!(latch.await_timeout(Duration::from_secs(1)));
}
