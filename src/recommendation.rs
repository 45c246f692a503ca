//! Recommendation engine: accumulates a score per candidate element from
//! four independent signals — direct relationships, access co-occurrence,
//! tag overlap, and a type-pairing heuristic — then filters and ranks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::RecommendationConfig;
use crate::element::{tag_jaccard, Element, ElementLike, ElementType};
use crate::error::Result;
use crate::relationship::RelationshipIndex;
use crate::repository::{ElementRepository, ListFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecommendation {
    pub id: String,
    pub score: f32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationFilters {
    pub element_type: Option<ElementType>,
    pub exclude_ids: HashSet<String>,
    pub min_score: f32,
    pub max_results: Option<usize>,
}

/// Pairs of element types that commonly get used together even without an
/// explicit relationship or shared tags.
const TYPE_AFFINITIES: &[(ElementType, ElementType)] = &[
    (ElementType::Skill, ElementType::Agent),
    (ElementType::Persona, ElementType::Agent),
    (ElementType::Template, ElementType::Skill),
];

fn types_have_affinity(a: ElementType, b: ElementType) -> bool {
    TYPE_AFFINITIES
        .iter()
        .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
}

pub struct RecommendationEngine {
    pub relationships: Arc<RelationshipIndex>,
    cooccurrence: RwLock<HashMap<(String, String), u32>>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(relationships: Arc<RelationshipIndex>, config: RecommendationConfig) -> Self {
        Self {
            relationships,
            cooccurrence: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn pair_key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Records that `a` and `b` were used together in the same session.
    pub fn record_cooccurrence(&self, a: &str, b: &str) {
        if a == b {
            return;
        }
        *self.cooccurrence.write().entry(Self::pair_key(a, b)).or_insert(0) += 1;
    }

    fn cooccurrence_count(&self, a: &str, b: &str) -> u32 {
        self.cooccurrence
            .read()
            .get(&Self::pair_key(a, b))
            .copied()
            .unwrap_or(0)
    }

    pub async fn recommend(
        &self,
        source: &Element,
        repository: &dyn ElementRepository,
        filters: RecommendationFilters,
    ) -> Result<Vec<ScoredRecommendation>> {
        let source_id = source.id().to_string();
        let source_tags: HashSet<&str> = source.metadata().tag_set();
        let mut scores: HashMap<String, (f32, Vec<String>)> = HashMap::new();

        let mut add = |id: &str, score: f32, reason: String| {
            if id == source_id {
                return;
            }
            let entry = scores.entry(id.to_string()).or_insert((0.0, Vec::new()));
            entry.0 = (entry.0 + score).min(1.0);
            entry.1.push(reason);
        };

        for rel in self.relationships.related_elements(&source_id) {
            add(&rel.to, 1.0, format!("direct relationship ({})", rel.relation_type));
        }

        let candidates = repository.list(ListFilter::default()).await?;

        for other in &candidates {
            let other_id = other.id();
            if other_id == source_id {
                continue;
            }

            let count = self.cooccurrence_count(&source_id, other_id);
            if count as usize >= self.config.cooccurrence_min_count {
                add(other_id, self.config.cooccurrence_weight, format!("co-occurred {count} times"));
            }

            let other_tags = other.metadata().tag_set();
            let jaccard = tag_jaccard(&source_tags, &other_tags);
            if jaccard >= self.config.tag_jaccard_min {
                add(
                    other_id,
                    jaccard * self.config.tag_jaccard_weight,
                    format!("tag overlap {jaccard:.2}"),
                );
            }

            if types_have_affinity(source.element_type(), other.element_type()) {
                add(other_id, self.config.type_heuristic_score, "type pairing heuristic".to_string());
            }
        }

        let mut recommendations: Vec<ScoredRecommendation> = scores
            .into_iter()
            .filter(|(id, _)| !filters.exclude_ids.contains(id))
            .filter(|(_, (score, _))| *score >= filters.min_score)
            .filter_map(|(id, (score, reasons))| {
                if let Some(wanted_type) = filters.element_type {
                    let matches = candidates
                        .iter()
                        .find(|c| c.id() == id)
                        .map(|c| c.element_type() == wanted_type)
                        .unwrap_or(false);
                    if !matches {
                        return None;
                    }
                }
                Some(ScoredRecommendation { id, score, reasons })
            })
            .collect();

        recommendations.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let max_results = filters.max_results.unwrap_or(self.config.max_results);
        recommendations.truncate(max_results);
        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationshipConfig;
    use crate::memory::Memory;
    use crate::repository::InMemoryElementRepository;

    async fn setup() -> (RecommendationEngine, InMemoryElementRepository) {
        let relationships = Arc::new(RelationshipIndex::new(RelationshipConfig::default()));
        let engine = RecommendationEngine::new(relationships, RecommendationConfig::default());
        let repo = InMemoryElementRepository::new();
        repo.create(Element::Memory(Memory::new("a", "A", "content"))).await.unwrap();
        repo.create(Element::Memory(Memory::new("b", "B", "content"))).await.unwrap();
        repo.create(Element::Memory(Memory::new("c", "C", "content"))).await.unwrap();
        (engine, repo)
    }

    #[tokio::test]
    async fn direct_relationship_outranks_everything_else() {
        let (engine, repo) = setup().await;
        engine.relationships.link("a", "b", "related_to", 1.0);
        let source = repo.get_by_id("a").await.unwrap();
        let recs = engine.recommend(&source, &repo, RecommendationFilters::default()).await.unwrap();
        assert_eq!(recs[0].id, "b");
        assert!((recs[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn cooccurrence_above_min_count_is_recommended() {
        let (engine, repo) = setup().await;
        engine.record_cooccurrence("a", "c");
        engine.record_cooccurrence("a", "c");
        let source = repo.get_by_id("a").await.unwrap();
        let recs = engine.recommend(&source, &repo, RecommendationFilters::default()).await.unwrap();
        assert!(recs.iter().any(|r| r.id == "c"));
    }

    #[tokio::test]
    async fn exclude_ids_filters_out_candidates() {
        let (engine, repo) = setup().await;
        engine.relationships.link("a", "b", "related_to", 1.0);
        let source = repo.get_by_id("a").await.unwrap();
        let mut exclude = HashSet::new();
        exclude.insert("b".to_string());
        let filters = RecommendationFilters {
            exclude_ids: exclude,
            ..RecommendationFilters::default()
        };
        let recs = engine.recommend(&source, &repo, filters).await.unwrap();
        assert!(recs.iter().all(|r| r.id != "b"));
    }

    #[tokio::test]
    async fn max_results_truncates_output() {
        let (engine, repo) = setup().await;
        engine.relationships.link("a", "b", "related_to", 1.0);
        engine.relationships.link("a", "c", "related_to", 1.0);
        let source = repo.get_by_id("a").await.unwrap();
        let filters = RecommendationFilters {
            max_results: Some(1),
            ..RecommendationFilters::default()
        };
        let recs = engine.recommend(&source, &repo, filters).await.unwrap();
        assert_eq!(recs.len(), 1);
    }
}
