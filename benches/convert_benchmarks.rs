//! Benchmarks for the per-frame work on the capture thread
//!
//! Run with: cargo bench --bench convert_benchmarks
//!
//! Measures BGRA→BGR normalization and the copy into a published frame, the
//! two costs paid for every color frame.

use bytes::Bytes;
use cleye_stream::buffers::{convert, FrameBuffers, ImageBuffer};
use cleye_stream::testing::fill_test_pattern;
use cleye_stream::{ColorMode, PixelFormat};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const RESOLUTIONS: [(u32, u32, &str); 2] = [(320, 240, "QVGA"), (640, 480, "VGA")];

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Normalize");

    for (width, height, name) in RESOLUTIONS {
        group.throughput(Throughput::Bytes((width * height * 4) as u64));

        let mut buffers = FrameBuffers::allocate(ColorMode::ColorRaw, width, height);
        fill_test_pattern(buffers.raw_mut().data_mut(), width, height, 0);
        group.bench_with_input(BenchmarkId::new("color", name), &(), |b, _| {
            b.iter(|| {
                buffers.normalize();
                black_box(buffers.output().data().len())
            })
        });

        let mut mono = FrameBuffers::allocate(ColorMode::MonoRaw, width, height);
        fill_test_pattern(mono.raw_mut().data_mut(), width, height, 0);
        group.bench_with_input(BenchmarkId::new("mono", name), &(), |b, _| {
            b.iter(|| {
                mono.normalize();
                black_box(mono.output().data().len())
            })
        });
    }

    group.finish();
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Convert BGRA to BGR");

    for (width, height, name) in RESOLUTIONS {
        let mut src = ImageBuffer::new(width, height, PixelFormat::Bgra8);
        fill_test_pattern(src.data_mut(), width, height, 7);
        let mut dst = ImageBuffer::new(width, height, PixelFormat::Bgr8);

        group.throughput(Throughput::Bytes(src.data().len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| convert(black_box(&src), &mut dst));
        });
    }

    group.finish();
}

fn bench_publish_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("Publish copy");

    for (width, height, name) in RESOLUTIONS {
        let buffers = FrameBuffers::allocate(ColorMode::ColorProcessed, width, height);
        group.throughput(Throughput::Bytes(buffers.output().data().len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| black_box(Bytes::copy_from_slice(buffers.output().data())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_convert, bench_publish_copy);
criterion_main!(benches);
