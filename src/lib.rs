//! In-process semantic memory engine for knowledge-worker agents.
//!
//! The engine composes a hybrid vector index, a working-memory TTL store, a
//! relationship graph, and consolidation/retention/recommendation services
//! over three external collaborators this crate only depends on through
//! traits: [`embeddings::EmbeddingProvider`], [`ner::NerProvider`], and
//! [`repository::ElementRepository`]. None of the three are durability or
//! model layers in their own right — see each module's doc comment for the
//! stand-in default this crate ships.

pub mod config;
pub mod consolidation;
pub mod constants;
pub mod element;
pub mod embeddings;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod ner;
pub mod recommendation;
pub mod relationship;
pub mod repository;
pub mod retention;
pub mod search;
pub mod vector;
pub mod working_memory;

pub use config::MemoryEngineConfig;
pub use error::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;

use element::{Element, ElementLike};
use embeddings::EmbeddingProvider;
use ner::NerProvider;
use recommendation::{RecommendationEngine, RecommendationFilters, ScoredRecommendation};
use relationship::{RelationshipIndex, RelationshipInference};
use repository::ElementRepository;
use retention::RetentionService;
use search::HybridSearchService;
use vector::ScoredHit;
use working_memory::WorkingMemoryService;

/// Thin composition root over the search, relationship, working-memory and
/// retention services, plus the collaborators they depend on. Callers that
/// only need one service are free to construct it directly instead.
pub struct MemoryEngine<E: EmbeddingProvider> {
    pub search: Arc<HybridSearchService<E>>,
    pub working_memory: Arc<WorkingMemoryService>,
    pub relationships: Arc<RelationshipIndex>,
    pub recommendations: RecommendationEngine,
    pub retention: Arc<RetentionService<E>>,
    pub repository: Arc<dyn ElementRepository>,
    embeddings: Arc<E>,
}

impl<E: EmbeddingProvider + 'static> MemoryEngine<E> {
    #[must_use]
    pub fn new(
        config: MemoryEngineConfig,
        dimensions: usize,
        embeddings: Arc<E>,
        repository: Arc<dyn ElementRepository>,
        snapshot_path: Option<std::path::PathBuf>,
    ) -> Self {
        let search = Arc::new(HybridSearchService::new(
            config.hnsw,
            dimensions,
            Arc::clone(&embeddings),
            snapshot_path,
        ));
        let relationships = Arc::new(RelationshipIndex::new(config.relationship));
        let retention = Arc::new(RetentionService::new(
            Arc::clone(&repository),
            Arc::clone(&search),
            config.retention,
        ));
        Self {
            search,
            working_memory: Arc::new(WorkingMemoryService::new(config.working_memory, Some(Arc::clone(&repository)))),
            recommendations: RecommendationEngine::new(Arc::clone(&relationships), config.recommendation),
            relationships,
            retention,
            repository,
            embeddings,
        }
    }

    /// Embeds and indexes an element, storing it through the repository and
    /// the hybrid search index in lock-step.
    pub async fn index_element(&self, element: Element) -> Result<()> {
        let text = element.searchable_text();
        let vector = self.search.embed_cached(&text).await?;
        let id = element.id().to_string();
        let mut metadata = HashMap::new();
        metadata.insert("element_type".to_string(), element.element_type().as_str().to_string());
        self.repository.create(element).await?;
        self.search.add(id, vector, metadata, text).await
    }

    pub async fn search(&self, query_text: &str, k: usize, filters: &HashMap<String, String>) -> Result<Vec<ScoredHit>> {
        let vector = self.search.embed_cached(query_text).await?;
        Ok(self.search.search(&vector, k, filters).await)
    }

    pub async fn remove_element(&self, id: &str) -> Result<()> {
        self.repository.delete(id).await?;
        self.search.delete(id).await
    }

    pub async fn recommend(&self, id: &str, filters: RecommendationFilters) -> Result<Vec<ScoredRecommendation>> {
        let source = self.repository.get_by_id(id).await?;
        self.recommendations.recommend(&source, self.repository.as_ref(), filters).await
    }

    /// Infers relationships across every currently-indexed element and
    /// records the ones clearing the inference engine's confidence gate.
    pub async fn infer_relationships(&self, _ner: &dyn NerProvider, inference: &RelationshipInference) -> Result<usize> {
        let elements = self.repository.list(repository::ListFilter::default()).await?;

        struct Owned {
            id: String,
            name: String,
            content: String,
            tags: Vec<String>,
            embedding: Vec<f32>,
        }

        let mut owned = Vec::with_capacity(elements.len());
        for elem in &elements {
            let text = elem.searchable_text();
            let vector = self.search.embed_cached(&text).await?;
            owned.push(Owned {
                id: elem.id().to_string(),
                name: elem.metadata().name.clone(),
                content: text,
                tags: elem.metadata().tags.clone(),
                embedding: vector,
            });
        }

        let candidates: Vec<relationship::InferenceCandidate> = owned
            .iter()
            .map(|o| relationship::InferenceCandidate {
                id: &o.id,
                name: &o.name,
                content: &o.content,
                tags: &o.tags,
                embedding: Some(&o.embedding),
            })
            .collect();

        let inferred = inference.infer_all(&candidates);
        for rel in &inferred {
            self.relationships.link(&rel.from, &rel.to, &rel.relation_type, rel.confidence);
        }
        Ok(inferred.len())
    }

    #[must_use]
    pub fn embedding_provider(&self) -> &Arc<E> {
        &self.embeddings
    }
}
