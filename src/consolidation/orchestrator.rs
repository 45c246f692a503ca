//! Consolidation pipeline: dedupe candidates, cluster what's left, extract a
//! knowledge summary, and hand back merge recommendations for the caller (or
//! this orchestrator itself, when auto-merge is enabled) to apply.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ConsolidationDefaults;
use crate::consolidation::clustering::{self, Cluster, ClusterPoint};
use crate::consolidation::duplicate::{DuplicateDetector, DuplicateGroup};
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::knowledge::{self, KnowledgeGraph};
use crate::ner::NerProvider;
use crate::repository::ElementRepository;
use crate::search::HybridSearchService;

#[derive(Debug, Clone, Copy)]
pub enum ClusterAlgorithm {
    Dbscan,
    Kmeans { k: usize },
}

impl Default for ClusterAlgorithm {
    fn default() -> Self {
        ClusterAlgorithm::Dbscan
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsolidationOptions {
    pub detect_duplicates: bool,
    pub auto_merge: bool,
    pub cluster: bool,
    pub cluster_algorithm: ClusterAlgorithm,
    pub extract_knowledge: bool,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self {
            detect_duplicates: true,
            auto_merge: false,
            cluster: true,
            cluster_algorithm: ClusterAlgorithm::Dbscan,
            extract_knowledge: false,
        }
    }
}

/// A duplicate group paired with a merge-worthiness score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecommendation {
    pub group: DuplicateGroup,
    pub confidence: f32,
    pub auto_applied: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub candidates_considered: usize,
    pub merge_recommendations: Vec<MergeRecommendation>,
    pub auto_merged_count: usize,
    #[serde(skip)]
    pub clusters: Vec<Cluster>,
    pub knowledge: Option<KnowledgeGraph>,
}

/// Confidence that a duplicate group is worth merging: average similarity
/// scaled by a group-size multiplier (larger groups corroborate the match,
/// a bare pair is weaker evidence), capped at 0.99 — never fully certain.
fn merge_confidence(group: &DuplicateGroup) -> f32 {
    let size = group.duplicate_ids.len() + 1;
    let multiplier = if size >= 5 {
        1.1
    } else if size == 2 {
        0.9
    } else {
        1.0
    };
    (group.average_similarity * multiplier).min(0.99)
}

pub struct MemoryConsolidationOrchestrator<E: EmbeddingProvider> {
    search: Arc<HybridSearchService<E>>,
    duplicate_detector: DuplicateDetector<E>,
    config: ConsolidationDefaults,
}

impl<E: EmbeddingProvider + 'static> MemoryConsolidationOrchestrator<E> {
    #[must_use]
    pub fn new(search: Arc<HybridSearchService<E>>, config: ConsolidationDefaults) -> Self {
        let duplicate_detector = DuplicateDetector::new(Arc::clone(&search), config);
        Self {
            search,
            duplicate_detector,
            config,
        }
    }

    /// Fetches `(vector, metadata, content)` for every id, bounded to
    /// `concurrency::DEFAULT_MAX_ELEMENTS` concurrent fetches and a
    /// per-fetch `concurrency::DEFAULT_FETCH_TIMEOUT` — the shared-resource
    /// policy applied to what would otherwise be an unbounded fan-out over
    /// the repository/index.
    async fn fetch_bounded(&self, ids: &[String]) -> Vec<(String, crate::element::Vector, String)> {
        use crate::constants::concurrency::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_ELEMENTS};

        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(DEFAULT_MAX_ELEMENTS) {
            let mut set = tokio::task::JoinSet::new();
            for id in chunk {
                let search = Arc::clone(&self.search);
                let id = id.clone();
                set.spawn(async move {
                    let fetched = tokio::time::timeout(DEFAULT_FETCH_TIMEOUT, search.get(&id)).await;
                    (id, fetched.ok().flatten())
                });
            }
            while let Some(joined) = set.join_next().await {
                if let Ok((id, Some((vector, _metadata, content)))) = joined {
                    results.push((id, vector, content));
                }
            }
        }
        results
    }

    pub async fn consolidate(
        &self,
        candidate_ids: &[String],
        repository: &dyn ElementRepository,
        ner: &dyn NerProvider,
        options: ConsolidationOptions,
        cancellation: &CancellationToken,
    ) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport {
            candidates_considered: candidate_ids.len(),
            ..ConsolidationReport::default()
        };

        if cancellation.is_cancelled() {
            return Ok(report);
        }

        if options.detect_duplicates {
            let groups = self.duplicate_detector.find_duplicates(candidate_ids).await;
            for group in groups {
                let confidence = merge_confidence(&group);
                let should_auto_apply = options.auto_merge && confidence >= self.config.auto_merge_confidence;
                if should_auto_apply {
                    self.duplicate_detector.merge_duplicates(repository, &group).await?;
                }
                report.merge_recommendations.push(MergeRecommendation {
                    group,
                    confidence,
                    auto_applied: should_auto_apply,
                });
            }
            report.auto_merged_count = report
                .merge_recommendations
                .iter()
                .filter(|r| r.auto_applied)
                .count();
            info!(
                groups = report.merge_recommendations.len(),
                auto_merged = report.auto_merged_count,
                "duplicate detection complete"
            );
        }

        if cancellation.is_cancelled() {
            return Ok(report);
        }

        if options.cluster {
            let merged_out: std::collections::HashSet<&str> = report
                .merge_recommendations
                .iter()
                .filter(|r| r.auto_applied)
                .flat_map(|r| r.group.duplicate_ids.iter().map(String::as_str))
                .collect();

            let surviving_ids: Vec<String> = candidate_ids
                .iter()
                .filter(|id| !merged_out.contains(id.as_str()))
                .cloned()
                .collect();
            let points: Vec<ClusterPoint> = self
                .fetch_bounded(&surviving_ids)
                .await
                .into_iter()
                .map(|(id, vector, _content)| ClusterPoint { id, vector })
                .collect();

            report.clusters = match options.cluster_algorithm {
                ClusterAlgorithm::Dbscan => {
                    clustering::dbscan(&points, self.config.dbscan_epsilon, self.config.dbscan_min_cluster_size)
                }
                ClusterAlgorithm::Kmeans { k } => {
                    clustering::kmeans(&points, k, self.config.kmeans_max_iterations)
                }
            };
        }

        if cancellation.is_cancelled() {
            return Ok(report);
        }

        if options.extract_knowledge {
            let contents: Vec<String> = self
                .fetch_bounded(candidate_ids)
                .await
                .into_iter()
                .map(|(_, _, content)| content)
                .collect();
            report.knowledge = Some(knowledge::build_knowledge_graph(ner, &contents).await);
        }

        Ok(report)
    }
}

/// Quality score for a single element: content length (clamped), tag
/// richness, and recency combine into a single 0..1 figure consumed by the
/// retention service's tiering.
#[must_use]
pub fn quality_score(content_len: usize, tag_count: usize, age_days: f64) -> f32 {
    let length_score = (content_len as f32 / 500.0).min(1.0);
    let tag_score = (tag_count as f32 / 5.0).min(1.0);
    let recency_score = (1.0 / (1.0 + age_days as f32 / 30.0)).clamp(0.0, 1.0);
    (0.4 * length_score + 0.2 * tag_score + 0.4 * recency_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswConfig;
    use crate::embeddings::HashingEmbeddingProvider;
    use crate::memory::Memory;
    use crate::ner::RuleBasedNerProvider;
    use crate::repository::InMemoryElementRepository;
    use crate::element::Element;

    async fn setup() -> (Arc<HybridSearchService<HashingEmbeddingProvider>>, InMemoryElementRepository) {
        let search = Arc::new(HybridSearchService::new(
            HnswConfig::default(),
            4,
            Arc::new(HashingEmbeddingProvider::new(4)),
            None,
        ));
        let repo = InMemoryElementRepository::new();
        for (id, vector, content) in [
            ("a", vec![1.0, 0.0, 0.0, 0.0], "alpha content"),
            ("b", vec![0.999, 0.001, 0.0, 0.0], "alpha content duplicate"),
            ("z", vec![0.0, 1.0, 0.0, 0.0], "unrelated content"),
        ] {
            search.add(id, vector, HashMap::new(), content).await.unwrap();
            repo.create(Element::Memory(Memory::new(id, id, content))).await.unwrap();
        }
        (search, repo)
    }

    #[tokio::test]
    async fn consolidate_detects_and_recommends_merge() {
        let (search, repo) = setup().await;
        let orchestrator = MemoryConsolidationOrchestrator::new(
            search,
            ConsolidationDefaults {
                similarity_threshold: 0.95,
                min_content_len: 0,
                ..ConsolidationDefaults::default()
            },
        );
        let ner = RuleBasedNerProvider;
        let options = ConsolidationOptions {
            cluster: false,
            ..ConsolidationOptions::default()
        };
        let report = orchestrator
            .consolidate(
                &["a".into(), "b".into(), "z".into()],
                &repo,
                &ner,
                options,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.merge_recommendations.len(), 1);
        assert!(!report.merge_recommendations[0].auto_applied);
    }

    #[tokio::test]
    async fn auto_merge_applies_high_confidence_groups() {
        let (search, repo) = setup().await;
        let orchestrator = MemoryConsolidationOrchestrator::new(
            search,
            ConsolidationDefaults {
                similarity_threshold: 0.95,
                auto_merge_confidence: 0.5,
                min_content_len: 0,
                ..ConsolidationDefaults::default()
            },
        );
        let ner = RuleBasedNerProvider;
        let options = ConsolidationOptions {
            cluster: false,
            auto_merge: true,
            ..ConsolidationOptions::default()
        };
        let report = orchestrator
            .consolidate(
                &["a".into(), "b".into(), "z".into()],
                &repo,
                &ner,
                options,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.auto_merged_count, 1);
        assert!(repo.get_by_id("a").await.is_ok());
        assert!(repo.get_by_id("b").await.is_ok());
        let merged_id = report.merge_recommendations[0].group.primary_id.clone();
        let candidates = repo.list(Default::default()).await.unwrap();
        assert!(candidates.iter().any(|e| {
            use crate::element::ElementLike;
            e.metadata().extra.get("merged_from").map(String::as_str) == Some(merged_id.as_str())
        }));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_any_phase() {
        let (search, repo) = setup().await;
        let orchestrator = MemoryConsolidationOrchestrator::new(search, ConsolidationDefaults::default());
        let ner = RuleBasedNerProvider;
        let token = CancellationToken::new();
        token.cancel();
        let report = orchestrator
            .consolidate(&["a".into()], &repo, &ner, ConsolidationOptions::default(), &token)
            .await
            .unwrap();
        assert!(report.merge_recommendations.is_empty());
        assert!(report.clusters.is_empty());
    }

    #[test]
    fn quality_score_rewards_longer_recent_richly_tagged_content() {
        let rich = quality_score(600, 5, 1.0);
        let sparse = quality_score(10, 0, 400.0);
        assert!(rich > sparse);
    }
}
