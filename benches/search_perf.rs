use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lookalike::search::cancel::CancelToken;
use lookalike::search::fusion::{FusionConfig, QueryVector, fuse, standard_methods};
use lookalike::search::index::ExactIndex;
use lookalike::search::snapshot::Snapshot;
use lookalike::search::store::{VectorRecord, VectorStore, encode_vector};

const ROWS: usize = 10_000;
const DIMENSION: usize = 64;

fn synthetic_snapshot() -> Arc<Snapshot> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let records: Vec<VectorRecord> = (0..ROWS)
        .map(|i| {
            let vector: Vec<f32> = (0..DIMENSION).map(|_| rng.gen_range(-1.0..1.0)).collect();
            VectorRecord {
                item_id: format!("item-{i:05}"),
                bytes: encode_vector(&vector),
            }
        })
        .collect();
    let store = VectorStore::from_records(records, DIMENSION).unwrap();
    Arc::new(Snapshot::build(store))
}

fn bench_search(c: &mut Criterion) {
    let snapshot = synthetic_snapshot();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let embedding: Vec<f32> = (0..DIMENSION).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let query = QueryVector::new(&embedding);
    let config = FusionConfig::default();
    let methods = standard_methods();
    let cancel = CancelToken::new();

    c.bench_function("fused_search_10k_x64_top10", |b| {
        b.iter(|| fuse(&snapshot, &query, 10, &config, &methods, &cancel).unwrap())
    });

    c.bench_function("cosine_index_10k_x64_top10", |b| {
        b.iter(|| {
            snapshot
                .cosine()
                .query(query.normalized(), 10, &cancel)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
