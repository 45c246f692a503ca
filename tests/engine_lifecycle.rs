use std::collections::HashMap;
use std::sync::Arc;

use semantic_memory_core::config::{HnswConfig, MemoryEngineConfig};
use semantic_memory_core::consolidation::{ConsolidationOptions, MemoryConsolidationOrchestrator};
use semantic_memory_core::element::Element;
use semantic_memory_core::embeddings::HashingEmbeddingProvider;
use semantic_memory_core::memory::Memory;
use semantic_memory_core::ner::RuleBasedNerProvider;
use semantic_memory_core::recommendation::RecommendationFilters;
use semantic_memory_core::repository::InMemoryElementRepository;
use semantic_memory_core::search::SearchBackend;
use semantic_memory_core::MemoryEngine;
use tokio_util::sync::CancellationToken;

fn engine() -> MemoryEngine<HashingEmbeddingProvider> {
    let repository = Arc::new(InMemoryElementRepository::new());
    MemoryEngine::new(
        MemoryEngineConfig::default(),
        384,
        Arc::new(HashingEmbeddingProvider::default()),
        repository,
        None,
    )
}

#[tokio::test]
async fn indexing_then_searching_finds_the_element() {
    let engine = engine();
    engine
        .index_element(Element::Memory(Memory::new("m1", "Launch notes", "we shipped the new onboarding flow today")))
        .await
        .unwrap();

    let hits = engine
        .search("onboarding flow launch", 5, &HashMap::new())
        .await
        .unwrap();
    assert!(hits.iter().any(|h| h.id == "m1"));
}

#[tokio::test]
async fn crossing_switchover_threshold_moves_search_to_hnsw() {
    let mut config = MemoryEngineConfig::default();
    config.hnsw = HnswConfig {
        switchover_size: 20,
        ..HnswConfig::default()
    };
    let repository = Arc::new(InMemoryElementRepository::new());
    let engine = MemoryEngine::new(config, 384, Arc::new(HashingEmbeddingProvider::default()), repository, None);

    for i in 0..25 {
        engine
            .index_element(Element::Memory(Memory::new(
                format!("m{i}"),
                format!("Memory {i}"),
                format!("entry number {i} about quarterly planning"),
            )))
            .await
            .unwrap();
    }

    assert_eq!(engine.search.backend().await, SearchBackend::Hnsw);
    let hits = engine.search("quarterly planning", 5, &HashMap::new()).await.unwrap();
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn remove_element_drops_it_from_both_repository_and_index() {
    let engine = engine();
    engine
        .index_element(Element::Memory(Memory::new("m1", "A", "some content")))
        .await
        .unwrap();
    engine.remove_element("m1").await.unwrap();

    assert!(engine.repository.get_by_id("m1").await.is_err());
    let hits = engine.search("some content", 5, &HashMap::new()).await.unwrap();
    assert!(hits.iter().all(|h| h.id != "m1"));
}

#[tokio::test]
async fn recommendations_surface_direct_relationships_first() {
    let engine = engine();
    engine
        .index_element(Element::Memory(Memory::new("a", "A", "alpha content")))
        .await
        .unwrap();
    engine
        .index_element(Element::Memory(Memory::new("b", "B", "beta content")))
        .await
        .unwrap();
    engine.relationships.link("a", "b", "related_to", 1.0);

    let recs = engine.recommend("a", RecommendationFilters::default()).await.unwrap();
    assert_eq!(recs[0].id, "b");
}

#[tokio::test]
async fn consolidation_merges_near_duplicate_memories() {
    let engine = engine();
    engine
        .index_element(Element::Memory(Memory::new(
            "a",
            "A",
            "the deployment pipeline now runs in parallel across regions",
        )))
        .await
        .unwrap();
    engine
        .index_element(Element::Memory(Memory::new(
            "b",
            "B",
            "the deployment pipeline now runs in parallel across regions",
        )))
        .await
        .unwrap();

    let orchestrator = MemoryConsolidationOrchestrator::new(
        Arc::clone(&engine.search),
        semantic_memory_core::config::ConsolidationDefaults::default(),
    );
    let ner = RuleBasedNerProvider;
    let options = ConsolidationOptions {
        auto_merge: true,
        cluster: false,
        ..ConsolidationOptions::default()
    };
    let report = orchestrator
        .consolidate(
            &["a".to_string(), "b".to_string()],
            engine.repository.as_ref(),
            &ner,
            options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.auto_merged_count, 1);
    assert!(engine.repository.get_by_id("a").await.is_ok());
    assert!(engine.repository.get_by_id("b").await.is_ok());

    use semantic_memory_core::element::ElementLike;
    let all = engine.repository.list(Default::default()).await.unwrap();
    let merged = all
        .iter()
        .find(|e| e.metadata().extra.contains_key("merged_from"))
        .expect("a merged element should have been created");
    match merged {
        Element::Memory(m) => assert!(m.content.contains("--- Merged Content ---")),
        _ => panic!("expected a memory element"),
    }
}
