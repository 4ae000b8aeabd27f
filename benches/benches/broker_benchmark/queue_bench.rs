use std::{hint::black_box, sync::Arc, thread};

use chanbus::{Broker, BrokerConfig, Queue};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_push_pop(c: &mut Criterion) {
    let queue = Queue::new("bench", None);
    c.bench_function("queue_push_pop", |b| {
        b.iter(|| {
            queue.push(black_box(42i64));
            black_box(queue.try_pop().ok());
        })
    });
}

fn bench_push_bounded_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_evicting");
    for capacity in [1usize, 64, 4096] {
        let queue = Queue::new("bench", Some(capacity));
        for i in 0..capacity as i64 {
            queue.push(i);
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, _| b.iter(|| black_box(queue.push(black_box(7i64)))),
        );
    }
    group.finish();
}

fn bench_handle_lookup(c: &mut Criterion) {
    let broker = Broker::new(BrokerConfig::default());
    let _warm = broker.publisher::<i64>("lookup").unwrap();
    c.bench_function("broker_publisher_lookup", |b| {
        b.iter(|| black_box(broker.publisher::<i64>(black_box("lookup")).unwrap()))
    });
}

fn bench_cross_thread(c: &mut Criterion) {
    const BATCH: u64 = 10_000;
    let mut group = c.benchmark_group("cross_thread");
    group.throughput(Throughput::Elements(BATCH));
    group.bench_function("spsc_10k", |b| {
        b.iter(|| {
            let broker = Arc::new(Broker::new(BrokerConfig::default()));
            let sub = broker.subscriber::<i64>("spsc").unwrap();
            let publisher = broker.publisher::<i64>("spsc").unwrap();
            let producer = thread::spawn(move || {
                for i in 0..BATCH as i64 {
                    publisher.push(i);
                }
            });
            for _ in 0..BATCH {
                black_box(sub.pop().unwrap());
            }
            producer.join().unwrap();
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_push_pop,
    bench_push_bounded_full,
    bench_handle_lookup,
    bench_cross_thread
);
criterion_main!(benches);
