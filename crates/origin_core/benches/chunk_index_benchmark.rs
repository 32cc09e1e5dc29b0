//! # Chunk Index Benchmark
//!
//! Relocation and multi-chunk gather for entities crossing chunk borders.
//!
//! Run with: `cargo bench --package origin_core --bench chunk_index_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use origin_core::{ChunkIndex, ChunkKey, Handle};

const ENTITY_COUNT: u32 = 100_000;
const CHUNK_SIZE: f64 = 1536.0;

fn populated_index() -> ChunkIndex {
    let mut index = ChunkIndex::with_capacity(ENTITY_COUNT as usize);
    for i in 1..=ENTITY_COUNT {
        let x = f64::from(i % 512) * 97.0;
        let y = f64::from(i / 512) * 97.0;
        index.add(
            Handle::new(i, 0),
            ChunkKey::from_world_position(0, 0, x, y, CHUNK_SIZE),
        );
    }
    index
}

/// Benchmark: Per-tick chunk updates where most entities stay put.
fn bench_update_chunk(c: &mut Criterion) {
    let mut index = populated_index();
    let mut offset = 0.0_f64;

    c.bench_function("update_chunk_100K", |b| {
        b.iter(|| {
            offset += 40.0;
            let mut moved = 0_u32;
            for i in 1..=ENTITY_COUNT {
                let x = f64::from(i % 512) * 97.0 + offset;
                let y = f64::from(i / 512) * 97.0;
                let key = ChunkKey::from_world_position(0, 0, x, y, CHUNK_SIZE);
                if index.update_chunk(Handle::new(i, 0), key) {
                    moved += 1;
                }
            }
            black_box(moved)
        });
    });
}

/// Benchmark: Gather a 5x5 chunk neighbourhood into a reused buffer.
fn bench_gather_neighbourhood(c: &mut Criterion) {
    let index = populated_index();
    let keys: Vec<ChunkKey> = (0..5)
        .flat_map(|x| (0..5).map(move |y| ChunkKey::pack(0, 0, x, y)))
        .collect();
    let mut out = Vec::with_capacity(4096);

    c.bench_function("gather_5x5_chunks", |b| {
        b.iter(|| {
            out.clear();
            index.entities_in_chunks_into(keys.iter().copied(), &mut out);
            black_box(out.len())
        });
    });
}

/// Benchmark: Remove and re-add every entity.
fn bench_remove_add(c: &mut Criterion) {
    let mut index = populated_index();
    let key = ChunkKey::pack(0, 0, 0, 0);

    c.bench_function("remove_add_10K", |b| {
        b.iter(|| {
            for i in 1..=10_000 {
                let h = Handle::new(i, 0);
                let previous = index.chunk_of(h).unwrap_or(key);
                index.remove(h);
                index.add(h, previous);
            }
            black_box(index.entity_count())
        });
    });
}

criterion_group!(
    benches,
    bench_update_chunk,
    bench_gather_neighbourhood,
    bench_remove_add,
);

criterion_main!(benches);
