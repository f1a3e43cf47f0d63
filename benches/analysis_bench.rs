//! Benchmarks for the analysis and detection paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memdna::analysis::{growth_fit, FeatureVector, FingerprintEngine, Quantization};
use memdna::detect::{IsolationForest, OutlierScorer, StatisticalScorer};
use memdna::history::{EngineSnapshot, Entity, EntityId, EntitySnapshot, Sample};
use std::time::Duration;

fn create_history(count: usize) -> Vec<Sample> {
    let id = EntityId::process(1, 1);
    (0..count)
        .map(|i| {
            let wobble = ((i * 7919) % 1000) as u64;
            Sample::with_timestamp(id, i as i64 * 10_000, 1_000_000 + i as u64 * 100 + wobble, 5.0)
        })
        .collect()
}

fn create_features(count: usize) -> Vec<FeatureVector> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            FeatureVector([1_000_000.0 + (t * 37.0) % 500.0, 0.05, 0.001 * (t % 5.0), 0.2])
        })
        .collect()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());

    for size in [10, 100, 200] {
        let history = create_history(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("compute_{}", size), |b| {
            b.iter(|| engine.compute(black_box(&history)).unwrap())
        });

        group.bench_function(format!("growth_fit_{}", size), |b| {
            b.iter(|| growth_fit(black_box(&history), Duration::from_secs(10)).unwrap())
        });
    }

    group.finish();
}

fn bench_scorers(c: &mut Criterion) {
    let mut group = c.benchmark_group("scorers");
    let training = create_features(50);
    let candidate = FeatureVector([5_000_000.0, 0.4, 0.1, 0.9]);

    let forest = IsolationForest::default();
    group.bench_function("isolation_forest_50", |b| {
        b.iter(|| forest.score(black_box(&training), black_box(&candidate)).unwrap())
    });

    let statistical = StatisticalScorer::new();
    group.bench_function("statistical_50", |b| {
        b.iter(|| statistical.score(black_box(&training), black_box(&candidate)).unwrap())
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    let entities: Vec<EntitySnapshot> = (0..50u32)
        .map(|pid| {
            let entity = Entity::new(EntityId::process(pid + 1, 1), format!("proc-{}", pid));
            let samples = create_history(200)
                .into_iter()
                .map(|mut s| {
                    s.entity_id = entity.id;
                    s
                })
                .collect();
            EntitySnapshot {
                entity,
                samples,
                fingerprint: None,
                previous_fingerprint: None,
            }
        })
        .collect();
    let snapshot = EngineSnapshot::new(entities);

    group.bench_function("encode", |b| b.iter(|| black_box(&snapshot).to_bytes().unwrap()));

    let bytes = snapshot.to_bytes().unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| EngineSnapshot::from_bytes(black_box(&bytes)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_scorers, bench_snapshot);
criterion_main!(benches);
