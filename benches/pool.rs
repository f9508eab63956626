use criterion::*;

fn criterion_benchmark(c: &mut Criterion) {
    let threads = threadkit::default_pool_size();

    let tasks = 1000;

    let mut group = c.benchmark_group("pool");
    group.sample_size(10);

    group.bench_function("thread_pool", |b| {
        b.iter_batched(
            || threadkit::ThreadPool::new(threads).unwrap(),
            |pool| {
                for _ in 0..tasks {
                    pool.execute(|| {
                        let _ = black_box(8 + 9);
                    });
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("thread_pool_submit", |b| {
        b.iter_batched(
            || threadkit::ThreadPool::new(threads).unwrap(),
            |pool| {
                let futures = pool.invoke_all((0..tasks).map(|i| move || black_box(i + 9)));

                for future in futures {
                    let _ = future.get();
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("worker_pool", |b| {
        b.iter_batched(
            || threadkit::WorkerPool::new(threads).unwrap(),
            |pool| {
                for _ in 0..tasks {
                    pool.execute(|| {
                        let _ = black_box(8 + 9);
                    });
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("threadpool", |b| {
        b.iter_batched(
            || threadpool::ThreadPool::new(threads),
            |pool| {
                for _ in 0..tasks {
                    pool.execute(|| {
                        let _ = black_box(8 + 9);
                    });
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
