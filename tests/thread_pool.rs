use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use threadkit::{CountDownLatch, Error, PoolState, TaskError, ThreadPool};

fn single_thread() -> ThreadPool {
    ThreadPool::new(1).unwrap()
}

#[test]
fn name_with_null_bytes_is_rejected() {
    let result = ThreadPool::builder().name("uh\0oh").build();

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn zero_size_is_rejected() {
    assert!(matches!(ThreadPool::new(0), Err(Error::InvalidArgument(_))));
    assert_eq!(
        ThreadPool::new(0).unwrap_err().to_string(),
        "invalid argument: thread pool size must be non-zero"
    );
}

#[test]
fn submit() {
    let pool = single_thread();

    let result = pool.submit(|| 2 + 2).get();

    assert_eq!(result, Ok(4));
}

#[test]
fn submit_sums_results() {
    let pool = ThreadPool::new(4).unwrap();

    let futures: Vec<_> = (1..=4).map(|i| pool.submit(move || i)).collect();
    let sum: i32 = futures.iter().map(|future| future.get().unwrap()).sum();

    assert_eq!(sum, 10);
}

#[test]
fn invoke_all_keeps_input_order() {
    let pool = ThreadPool::new(3).unwrap();

    let futures = pool.invoke_all((0..8u64).map(|i| {
        move || {
            thread::sleep(Duration::from_millis(8 - i));
            i * 10
        }
    }));

    let results: Vec<_> = futures.iter().map(|future| future.get().unwrap()).collect();

    assert_eq!(results, vec![0, 10, 20, 30, 40, 50, 60, 70]);
}

#[test]
fn name() {
    let pool = ThreadPool::builder().name("foo").size(1).build().unwrap();

    let name = pool
        .submit(|| thread::current().name().unwrap().to_owned())
        .get();

    assert_eq!(name, Ok(String::from("foo")));
}

#[test]
fn panic_fails_future() {
    let pool = single_thread();

    let future = pool.submit(|| -> i32 { panic!("oh no!") });

    assert_eq!(future.get(), Err(TaskError::Panicked(String::from("oh no!"))));
}

#[test]
fn panicked_tasks_are_counted() {
    let pool = single_thread();

    assert_eq!(pool.panicked_tasks(), 0);

    pool.submit::<(), _>(|| panic!("oh no!")).wait();
    pool.execute(|| ());

    // Counters are final once every worker has exited.
    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(1)));

    assert_eq!(pool.panicked_tasks(), 1);
    assert_eq!(pool.completed_tasks(), 2);
}

#[test]
fn tasks_completed() {
    let pool = ThreadPool::default();
    assert_eq!(pool.completed_tasks(), 0);

    pool.submit(|| 2 + 2).get().unwrap();
    pool.submit(|| 2 + 2).get().unwrap();

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(1)));
    assert_eq!(pool.completed_tasks(), 2);
    assert_eq!(pool.running_tasks(), 0);
}

#[test]
fn thread_count() {
    let pool = ThreadPool::new(3).unwrap();

    assert_eq!(pool.pool_size(), 3);
    assert_eq!(pool.threads(), 3);
}

#[test]
fn queued_tasks_run_after_shutdown() {
    let pool = single_thread();
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

    assert!(pool.await_termination(Duration::from_secs(5)));
    assert!(pool.is_terminated());
    assert_eq!(pool.threads(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn submissions_after_shutdown_are_rejected() {
    let pool = ThreadPool::new(2).unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    pool.shutdown();

    let future = pool.submit(|| 1);
    assert!(future.is_done());
    assert_eq!(future.get(), Err(TaskError::Rejected));
    assert_eq!(future.get().unwrap_err().to_string(), "pool is shut down");

    let counter = count.clone();
    pool.execute(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(pool.await_termination(Duration::from_secs(1)));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(pool.completed_tasks(), 0);
}

#[test]
fn shutdown_now_discards_queued_tasks() {
    let pool = ThreadPool::new(1).unwrap();
    let started = Arc::new(CountDownLatch::new(1));
    let release = Arc::new(CountDownLatch::new(1));

    let running = {
        let started = started.clone();
        let release = release.clone();
        pool.submit(move || {
            started.count_down();
            release.wait();
            "finished"
        })
    };

    started.wait();

    let queued: Vec<_> = (0..3).map(|i| pool.submit(move || i)).collect();
    assert_eq!(pool.queued_tasks(), 3);

    assert_eq!(pool.shutdown_now(), 3);
    assert_eq!(pool.state(), PoolState::ShuttingDown);

    for future in &queued {
        assert_eq!(future.get(), Err(TaskError::Discarded));
    }

    release.count_down();

    assert!(pool.await_termination(Duration::from_secs(1)));
    assert_eq!(pool.state(), PoolState::Terminated);
    assert_eq!(running.get(), Ok("finished"));
}

#[test]
fn await_termination_times_out_while_task_runs() {
    let pool = single_thread();

    pool.execute(|| thread::sleep(Duration::from_millis(100)));
    pool.shutdown();

    assert!(!pool.await_termination(Duration::from_millis(10)));
    assert!(pool.await_termination(Duration::from_secs(1)));
}

#[test]
fn await_termination_without_shutdown_times_out() {
    let pool = single_thread();

    assert!(!pool.await_termination(Duration::from_millis(10)));
    assert_eq!(pool.state(), PoolState::Running);
}

#[test]
fn join() {
    // Just a dumb test to make sure join doesn't do anything strange.
    ThreadPool::default().join();
}

#[test]
fn join_timeout_expiring() {
    let pool = single_thread();
    assert_eq!(pool.threads(), 1);

    pool.execute(|| thread::sleep(Duration::from_millis(50)));

    // Joining should time out since there's one task still running longer
    // than our join timeout.
    assert!(!pool.join_timeout(Duration::from_millis(10)));
}

#[test]
fn dropping_pool_finishes_queued_work() {
    let latch = Arc::new(CountDownLatch::new(3));

    {
        let pool = single_thread();

        for _ in 0..3 {
            let latch = latch.clone();
            pool.execute(move || latch.count_down());
        }
    }

    assert!(latch.await_timeout(Duration::from_secs(1)));
}
