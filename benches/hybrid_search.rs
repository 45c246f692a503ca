use std::collections::HashMap;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use semantic_memory_core::config::HnswConfig;
use semantic_memory_core::embeddings::HashingEmbeddingProvider;
use semantic_memory_core::search::HybridSearchService;

const DIMENSIONS: usize = 64;

fn random_vector(seed: u64, dims: usize) -> Vec<f32> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    (0..dims).map(|_| rng.random_range(-1.0f32..=1.0f32)).collect()
}

fn seeded_service(rt: &tokio::runtime::Runtime, n: usize) -> Arc<HybridSearchService<HashingEmbeddingProvider>> {
    let service = Arc::new(HybridSearchService::new(
        HnswConfig::default(),
        DIMENSIONS,
        Arc::new(HashingEmbeddingProvider::new(DIMENSIONS)),
        None,
    ));
    rt.block_on(async {
        for i in 0..n {
            service
                .add(format!("id-{i}"), random_vector(i as u64, DIMENSIONS), HashMap::new(), "content")
                .await
                .unwrap();
        }
    });
    service
}

fn bench_search_below_switchover(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = seeded_service(&rt, 50);
    let query = random_vector(999, DIMENSIONS);

    c.bench_function("flat_search_50_items", |b| {
        b.to_async(&rt).iter(|| {
            let service = Arc::clone(&service);
            let query = query.clone();
            async move { service.search(&query, 10, &HashMap::new()).await }
        });
    });
}

fn bench_search_above_switchover(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = seeded_service(&rt, 500);
    let query = random_vector(999, DIMENSIONS);

    c.bench_function("hnsw_search_500_items", |b| {
        b.to_async(&rt).iter(|| {
            let service = Arc::clone(&service);
            let query = query.clone();
            async move { service.search(&query, 10, &HashMap::new()).await }
        });
    });
}

fn bench_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("hybrid_insert_single", |b| {
        b.to_async(&rt).iter_batched(
            || {
                Arc::new(HybridSearchService::new(
                    HnswConfig::default(),
                    DIMENSIONS,
                    Arc::new(HashingEmbeddingProvider::new(DIMENSIONS)),
                    None,
                ))
            },
            |service| async move {
                service
                    .add("bench-id", random_vector(1, DIMENSIONS), HashMap::new(), "content")
                    .await
                    .unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_search_below_switchover, bench_search_above_switchover, bench_insert);
criterion_main!(benches);
