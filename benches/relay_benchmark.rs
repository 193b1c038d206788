//! Performance benchmarks for StreamRelay
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io;
use streamrelay::prelude::*;

/// Sink that only counts bytes
struct NullSink;

impl Sink for NullSink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        black_box(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn create_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_buffer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_buffer_size");
    let payload = create_payload(4 * 1024 * 1024);
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for buffer_size in [128usize, 4 * 1024, 64 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("blocking", humansize::format_size(buffer_size as u64, humansize::BINARY)),
            &buffer_size,
            |b, &buffer_size| {
                b.iter(|| {
                    let relay = StreamRelay::new(SliceSource::new(payload.clone()), NullSink);
                    relay.set_buffer_size(buffer_size).unwrap();
                    relay.start().unwrap();
                    black_box(relay.join().unwrap().stats)
                });
            },
        );
    }

    group.finish();
}

fn bench_autoflush(c: &mut Criterion) {
    let payload = create_payload(1024 * 1024);

    c.bench_function("relay_autoflush_1mb", |b| {
        b.iter(|| {
            let relay = RelayBuilder::new()
                .source(SliceSource::new(payload.clone()))
                .sink(NullSink)
                .buffer_size(4096)
                .autoflush(true)
                .build()
                .unwrap();
            relay.start().unwrap();
            black_box(relay.join().unwrap().stats)
        });
    });
}

fn bench_start_stop(c: &mut Criterion) {
    c.bench_function("relay_start_wait_empty", |b| {
        b.iter(|| {
            let relay = StreamRelay::new(SliceSource::default(), NullSink);
            relay.start().unwrap();
            relay.wait_for().unwrap();
            black_box(relay.is_finished())
        });
    });
}

criterion_group!(benches, bench_buffer_sizes, bench_autoflush, bench_start_stop);

criterion_main!(benches);
