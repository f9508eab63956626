#![doc = include_str!("../README.md")]

mod cron;
mod error;
mod future;
mod global;
mod pool;
mod sync;
mod task;
mod worker;
mod worker_pool;

pub use crate::{
    cron::{Cron, CronExpression},
    error::{Error, Result, TaskError},
    future::{Future, FutureState, Promise},
    global::{configure_global, global, go},
    pool::{default_pool_size, Builder, PoolState, ThreadPool},
    sync::{CountDownLatch, Mutex, MutexGuard, Semaphore, WaitGroup},
    worker_pool::WorkerPool,
};
