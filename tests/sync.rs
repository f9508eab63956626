use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use threadkit::{CountDownLatch, Mutex, Semaphore, WaitGroup};

#[test]
fn mutex_with_lock_loses_no_updates() {
    let counter = Arc::new(Mutex::new(0));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    counter.with_lock(|count| *count += 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*counter.lock(), 2000);
}

#[test]
fn mutex_try_lock_fails_while_held() {
    let mutex = Mutex::new(());

    let guard = mutex.lock();
    assert!(mutex.try_lock().is_none());

    guard.unlock();
    assert!(mutex.try_lock().is_some());
}

#[test]
fn mutex_released_when_body_panics() {
    let mutex = Arc::new(Mutex::new(1));

    let result = {
        let mutex = mutex.clone();
        thread::spawn(move || {
            mutex.with_lock::<(), _>(|value| {
                *value = 2;
                panic!("oh no!");
            })
        })
        .join()
    };

    assert!(result.is_err());
    assert_eq!(mutex.with_lock(|value| *value), 2);
    assert_eq!(Arc::try_unwrap(mutex).unwrap().into_inner(), 2);
}

#[test]
fn semaphore_try_acquire_from_another_thread() {
    let semaphore = Arc::new(Semaphore::new(1));
    semaphore.acquire();

    let other = semaphore.clone();
    assert!(!thread::spawn(move || other.try_acquire()).join().unwrap());

    semaphore.release();

    let other = semaphore.clone();
    assert!(thread::spawn(move || other.try_acquire()).join().unwrap());
    assert_eq!(semaphore.available_permits(), 0);
}

#[test]
fn semaphore_release_wakes_blocked_acquirer() {
    let semaphore = Arc::new(Semaphore::new(0));
    let acquired = Arc::new(AtomicUsize::new(0));

    let handle = {
        let semaphore = semaphore.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            semaphore.acquire();
            acquired.store(1, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(acquired.load(Ordering::SeqCst), 0);

    semaphore.release();
    handle.join().unwrap();

    assert_eq!(acquired.load(Ordering::SeqCst), 1);
    assert_eq!(semaphore.available_permits(), 0);
}

#[test]
fn semaphore_acquire_timeout() {
    let semaphore = Semaphore::new(0);
    assert!(!semaphore.acquire_timeout(Duration::from_millis(10)));

    semaphore.release_n(2);
    assert_eq!(semaphore.available_permits(), 2);
    assert!(semaphore.acquire_timeout(Duration::from_millis(10)));
    assert_eq!(semaphore.available_permits(), 1);
}

#[test]
fn wait_group_waits_for_every_done() {
    let wg = Arc::new(WaitGroup::new());
    let finished = Arc::new(AtomicUsize::new(0));
    wg.add(2);

    for delay in &[20, 60] {
        let wg = wg.clone();
        let finished = finished.clone();
        let delay = Duration::from_millis(*delay);

        thread::spawn(move || {
            thread::sleep(delay);
            finished.fetch_add(1, Ordering::SeqCst);
            wg.done();
        });
    }

    assert!(!wg.wait_timeout(Duration::from_millis(5)));

    wg.wait();
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(wg.count(), 0);
}

#[test]
fn wait_group_underflow_is_clamped() {
    let wg = WaitGroup::new();
    wg.add(1);

    wg.add(-3);
    assert_eq!(wg.count(), 0);

    // Does not block.
    wg.wait();

    wg.done();
    assert_eq!(wg.count(), 0);

    wg.add(2);
    assert_eq!(wg.count(), 2);
}

#[test]
fn latch_await_timeout() {
    let latch = CountDownLatch::new(1);
    assert!(!latch.await_timeout(Duration::ZERO));

    latch.count_down();
    assert!(latch.await_timeout(Duration::from_secs(1)));
}

#[test]
fn latch_count_floors_at_zero() {
    let latch = Arc::new(CountDownLatch::new(2));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let latch = latch.clone();
            thread::spawn(move || latch.count_down())
        })
        .collect();

    latch.wait();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(latch.count(), 0);
}

#[test]
fn latch_with_zero_count_is_open() {
    let latch = CountDownLatch::new(0);

    latch.wait();
    assert!(latch.await_timeout(Duration::ZERO));
}
