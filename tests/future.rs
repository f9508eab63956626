use std::{
    future::Future as _,
    task::{Context, Poll},
    thread,
    time::Duration,
};

use threadkit::{Future, FutureState, TaskError};

/// Drive a std future to completion by parking the current thread between
/// polls.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let current = thread::current();
    let waker = waker_fn::waker_fn(move || current.unpark());
    let mut cx = Context::from_waker(&waker);
    let mut future = Box::pin(future);

    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => thread::park(),
        }
    }
}

#[test]
fn pending_until_promise_succeeds() {
    let (future, promise) = Future::pending();

    assert_eq!(future.state(), FutureState::Pending);
    assert!(!future.is_done());
    assert_eq!(future.try_get(), None);

    promise.succeed(String::from("hello"));

    assert_eq!(future.state(), FutureState::Succeeded);
    assert!(future.is_done());
    assert_eq!(future.get(), Ok(String::from("hello")));
}

#[test]
fn every_waiter_observes_the_same_value() {
    let (future, promise) = Future::pending();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let future = future.clone();
            thread::spawn(move || future.get())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    promise.succeed(7);

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Ok(7));
    }
}

#[test]
fn failed_promise() {
    let (future, promise) = Future::<i32>::pending();

    promise.fail("bad input");

    assert_eq!(future.state(), FutureState::Failed);
    assert_eq!(future.get(), Err(TaskError::Failed(String::from("bad input"))));
    assert_eq!(future.get().unwrap_err().to_string(), "bad input");
}

#[test]
fn dropped_promise_discards_future() {
    let (future, promise) = Future::<i32>::pending();

    drop(promise);

    assert_eq!(future.get(), Err(TaskError::Discarded));
}

#[test]
fn get_timeout_on_pending_future() {
    let (future, promise) = Future::pending();

    assert_eq!(future.get_timeout(Duration::from_millis(10)), None);

    promise.succeed(1);
    assert_eq!(future.get_timeout(Duration::from_millis(10)), Some(Ok(1)));
}

#[test]
fn pre_resolved_futures() {
    assert_eq!(Future::succeeded(3).get(), Ok(3));

    let rejected = Future::<()>::failed(TaskError::Rejected);
    assert!(rejected.is_done());
    assert_eq!(rejected.get().unwrap_err().to_string(), "pool is shut down");
}

#[test]
fn awaited_as_std_future() {
    let (future, promise) = Future::pending();

    let resolver = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        promise.succeed(42);
    });

    assert_eq!(block_on(future), Ok(42));
    resolver.join().unwrap();
}
