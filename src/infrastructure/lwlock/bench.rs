use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;

use aistore_tblspc::infrastructure::lwlock::{LwLock, LwLockMode};

// Test configuration
const READ_THREADS: usize = 8;
const WRITE_THREADS: usize = 1;
const OPERATIONS_PER_THREAD: usize = 10_000;

// Readers take the lock shared, writers exclusive, like directory lookups
// racing tablespace create/drop.
fn bench_lock_scenario(b: &mut criterion::Bencher, readers: usize, writers: usize) {
    b.iter(|| {
        let lock = Arc::new(LwLock::new("TablespaceCreateLock"));

        let read_handles: Vec<_> = (0..readers)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..OPERATIONS_PER_THREAD {
                        let _guard = lock.acquire(LwLockMode::Shared);
                    }
                })
            })
            .collect();

        let write_handles: Vec<_> = (0..writers)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..OPERATIONS_PER_THREAD {
                        let _guard = lock.acquire(LwLockMode::Exclusive);
                    }
                })
            })
            .collect();

        for handle in read_handles.into_iter().chain(write_handles) {
            handle.join().unwrap();
        }
    });
}

pub fn bench_rw_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("LwLock");
    group.bench_function("ReadWriteMix", |b| {
        bench_lock_scenario(b, READ_THREADS, WRITE_THREADS)
    });
    group.bench_function("ReadOnly", |b| bench_lock_scenario(b, READ_THREADS, 0));
    group.bench_function("WriteOnly", |b| bench_lock_scenario(b, 0, WRITE_THREADS + 3));
    group.finish();
}

pub fn bench_try_acquire(c: &mut Criterion) {
    let lock = LwLock::new("TablespaceCreateLock");
    c.bench_function("LwLock/TryAcquireUncontended", |b| {
        b.iter(|| {
            let guard = lock.try_acquire(LwLockMode::Exclusive);
            assert!(guard.is_some());
        })
    });
}

criterion_group!(benches, bench_rw_mix, bench_try_acquire);
criterion_main!(benches);
