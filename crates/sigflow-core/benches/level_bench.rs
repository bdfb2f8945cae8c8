//! Criterion benchmarks for buffer levels (`sigflow-core::level`).
//!
//! Measures the cost of moving frames through a level independently of any
//! component work. Three axes:
//!
//! - **Frame** - single-frame write + read through a registered reader
//! - **Block** - block write + read at varying block sizes and widths
//! - **Growth** - filling a growable ring level from a small start capacity
//!
//! Run with: `cargo bench -p sigflow-core -- level/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sigflow_core::{Block, Frame, Level, LevelConfig, OverflowPolicy, Padding};

const BLOCK_SIZES: &[usize] = &[16, 64, 256, 1024];
const WIDTHS: &[usize] = &[1, 13, 40];

fn ring(capacity: usize, width: usize) -> Level {
    let config = LevelConfig::new("bench", capacity).with_overflow(OverflowPolicy::Wait);
    Level::with_fields(config, &[("x", width)]).unwrap()
}

// ---------------------------------------------------------------------------
// Frame benchmarks
// ---------------------------------------------------------------------------

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("level/frame");

    for &width in WIDTHS {
        let level = ring(64, width);
        let reader = level.register_reader_unchecked();
        let frame = Frame::new(vec![0.5; width]);
        group.bench_with_input(BenchmarkId::new("write_read", width), &width, |b, _| {
            b.iter(|| {
                level.append_frame(black_box(&frame)).unwrap();
                black_box(level.get_next_frame(reader).unwrap());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Block benchmarks
// ---------------------------------------------------------------------------

fn bench_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("level/block");

    for &len in BLOCK_SIZES {
        for &width in &[1usize, 13] {
            let level = ring(len * 4, width);
            let reader = level.register_reader_unchecked();
            let block = Block::from_values(width, vec![0.25; len * width]).unwrap();
            let id = BenchmarkId::new(format!("w{width}"), len);
            group.bench_with_input(id, &len, |b, &len| {
                b.iter(|| {
                    level.append_block(black_box(&block)).unwrap();
                    black_box(level.get_next_block(reader, len, Padding::None).unwrap());
                });
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Growth benchmarks
// ---------------------------------------------------------------------------

fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("level/growth");

    // doubling path: single-frame writes
    group.bench_function("frames_to_4096", |b| {
        b.iter(|| {
            let level = Level::with_fields(LevelConfig::new("g", 4).growable(true), &[("x", 1)]).unwrap();
            let _reader = level.register_reader_unchecked();
            let frame = Frame::scalar(1.0);
            for _ in 0..4096 {
                level.append_frame(&frame).unwrap();
            }
            black_box(level.config().capacity);
        });
    });

    // general path: block writes grow to arbitrary sizes
    group.bench_function("blocks_to_4096", |b| {
        let block = Block::from_values(1, vec![1.0; 100]).unwrap();
        b.iter(|| {
            let level = Level::with_fields(LevelConfig::new("g", 4).growable(true), &[("x", 1)]).unwrap();
            let _reader = level.register_reader_unchecked();
            for _ in 0..41 {
                level.append_block(&block).unwrap();
            }
            black_box(level.config().capacity);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_frame, bench_block, bench_growth);
criterion_main!(benches);
