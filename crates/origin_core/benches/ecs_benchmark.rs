//! # ECS Performance Benchmark
//!
//! Targets for one shard:
//! - 100,000 entities spread over a handful of archetypes
//! - prepared query iteration allocation-free once warm
//! - spawn/despawn churn O(1) per entity
//!
//! Run with: `cargo bench --package origin_core --bench ecs_benchmark`

// Benchmarks don't need docs and may have intentionally unused code
#![allow(missing_docs)]
#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use origin_core::{Component, ComponentId, ComponentRegistry, EntityId, Handle, World};

const ENTITY_COUNT: usize = 100_000;

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {
    const ID: ComponentId = ComponentId::new(1);
}

#[derive(Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {
    const ID: ComponentId = ComponentId::new(2);
}

#[derive(Clone, Copy)]
struct Sleeping;
impl Component for Sleeping {
    const ID: ComponentId = ComponentId::new(3);
}

fn populated_world(count: usize) -> (World, Vec<Handle>) {
    let registry = ComponentRegistry::builder()
        .register::<Position>()
        .register::<Velocity>()
        .register::<Sleeping>()
        .build();
    let mut world = World::new(registry);
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let h = world.spawn(EntityId(i as u64));
        world.add_component(h, Position { x: i as f32, y: 0.0 });
        world.add_component(h, Velocity { dx: 0.1, dy: 0.2 });
        if i % 4 == 0 {
            world.add_component(h, Sleeping);
        }
        handles.push(h);
    }
    (world, handles)
}

/// Benchmark: Spawn entities with two components.
fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_with_components");

    for count in [1_000, 10_000, ENTITY_COUNT] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let (world, _) = populated_world(count);
                black_box(world.entity_count())
            });
        });
    }

    group.finish();
}

/// Benchmark: Prepared query driving a movement update.
fn bench_prepared_query_movement(c: &mut Criterion) {
    let (mut world, _) = populated_world(ENTITY_COUNT);
    let mut moving = world
        .query()
        .with::<Position>()
        .with::<Velocity>()
        .without::<Sleeping>()
        .prepare();
    let mut scratch = Vec::with_capacity(ENTITY_COUNT);

    c.bench_function("prepared_query_movement_100K", |b| {
        b.iter(|| {
            scratch.clear();
            moving.handles_into(&world, &mut scratch);
            for &h in &scratch {
                let Some(&Velocity { dx, dy }) = world.get_component::<Velocity>(h) else {
                    continue;
                };
                world.mutate_component::<Position, _>(h, |p| {
                    p.x += dx * 0.016;
                    p.y += dy * 0.016;
                });
            }
            black_box(scratch.len())
        });
    });
}

/// Benchmark: Dense storage sweep (theoretical minimum for the same work).
fn bench_dense_sweep(c: &mut Criterion) {
    let (mut world, _) = populated_world(ENTITY_COUNT);

    c.bench_function("dense_position_sweep_100K", |b| {
        b.iter(|| {
            for p in world.storage_mut::<Position>().values_mut() {
                p.x += 0.001;
            }
            black_box(world.storage::<Position>().len())
        });
    });
}

/// Benchmark: Ad-hoc query counting.
fn bench_adhoc_count(c: &mut Criterion) {
    let (world, _) = populated_world(ENTITY_COUNT);

    c.bench_function("adhoc_query_count_100K", |b| {
        b.iter(|| black_box(world.query().with::<Position>().without::<Sleeping>().count()));
    });
}

/// Benchmark: Archetype transition (add/remove a tag component).
fn bench_archetype_transition(c: &mut Criterion) {
    let (mut world, handles) = populated_world(10_000);

    c.bench_function("toggle_tag_10K", |b| {
        b.iter(|| {
            for &h in &handles {
                if world.remove_component::<Sleeping>(h).is_none() {
                    world.add_component(h, Sleeping);
                }
            }
            black_box(world.entity_count())
        });
    });
}

/// Benchmark: Entity spawn/despawn cycle.
fn bench_spawn_despawn_cycle(c: &mut Criterion) {
    let (mut world, _) = populated_world(ENTITY_COUNT / 2);
    let mut batch = Vec::with_capacity(10_000);

    c.bench_function("spawn_despawn_cycle_10K", |b| {
        b.iter(|| {
            for i in 0..10_000_u64 {
                let h = world.spawn(EntityId(1_000_000 + i));
                world.add_component(h, Position { x: 0.0, y: 0.0 });
                batch.push(h);
            }
            for h in batch.drain(..) {
                world.despawn(h);
            }
            black_box(world.entity_count())
        });
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_prepared_query_movement,
    bench_dense_sweep,
    bench_adhoc_count,
    bench_archetype_transition,
    bench_spawn_despawn_cycle,
);

criterion_main!(benches);
