//! Criterion benchmark untuk Ring Buffer
//!
//! Run dengan: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dataman::core::{RingBuffer, SampleBlock};
use dataman::protocol::{ControlFrame, ControlMessage, Decoder, Encoder};

const CHANNELS: usize = 8;
const CAPACITY: usize = 1 << 16;

fn bench_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("dataman_bench_{}_{}.shm", tag, std::process::id()))
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");

    let mut rb: RingBuffer<f32> = RingBuffer::create_at(bench_path("rw"), CHANNELS, CAPACITY).unwrap();

    for width in [64usize, 1024, 16384] {
        let block = SampleBlock::<f32>::zeros(CHANNELS, width);
        group.throughput(Throughput::Elements((CHANNELS * width) as u64));

        group.bench_with_input(BenchmarkId::new("write", width), &block, |b, block| {
            let mut start = 0;
            b.iter(|| {
                rb.write(black_box(block), start).unwrap();
                start = (start + width) % (CAPACITY - width + 1);
            });
        });

        group.bench_with_input(BenchmarkId::new("read_copy", width), &width, |b, &width| {
            b.iter(|| {
                let window = rb.read(black_box(0), width).unwrap();
                black_box(window.to_block());
            });
        });
    }

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("availability");
    group.throughput(Throughput::Elements(1));

    let mut rb: RingBuffer<f32> = RingBuffer::create_at(bench_path("avail"), 1, CAPACITY).unwrap();
    rb.publish(CAPACITY / 2).unwrap();

    group.bench_function("classify", |b| {
        let mut start = 0;
        b.iter(|| {
            black_box(rb.classify(black_box(start), start + 256));
            start = (start + 97) % (CAPACITY - 256);
        });
    });

    group.finish();
}

fn bench_protocol(c: &mut Criterion) {
    let mut group = c.benchmark_group("control_frame");

    for batch_size in [1usize, 64] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_function(format!("encode_decode_{}", batch_size), |b| {
            let mut encoder = Encoder::new(batch_size);
            b.iter(|| {
                encoder.reset();
                for i in 0..batch_size {
                    encoder.encode(ControlMessage::Position(black_box(i as u64)));
                }
                for frame in Decoder::new(encoder.as_bytes()) {
                    let _: ControlFrame = black_box(frame.unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_read, bench_classify, bench_protocol);
criterion_main!(benches);
