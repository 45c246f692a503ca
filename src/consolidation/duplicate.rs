//! Near-duplicate detection: for each candidate, run a private hybrid search
//! over its own neighborhood and group whatever clears the similarity bar.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ConsolidationDefaults;
use crate::element::{Element, ElementLike};
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::memory::Memory;
use crate::repository::ElementRepository;
use crate::search::HybridSearchService;

/// A cluster of near-duplicate ids centered on `primary_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub primary_id: String,
    pub duplicate_ids: Vec<String>,
    pub average_similarity: f32,
}

pub struct DuplicateDetector<E: EmbeddingProvider> {
    search: Arc<HybridSearchService<E>>,
    config: ConsolidationDefaults,
}

impl<E: EmbeddingProvider> DuplicateDetector<E> {
    #[must_use]
    pub fn new(search: Arc<HybridSearchService<E>>, config: ConsolidationDefaults) -> Self {
        Self { search, config }
    }

    /// Groups `candidate_ids` into near-duplicate clusters. Each candidate
    /// appears in at most one group, as either a primary or a duplicate.
    pub async fn find_duplicates(&self, candidate_ids: &[String]) -> Vec<DuplicateGroup> {
        let mut assigned: HashSet<String> = HashSet::new();
        let mut groups = Vec::new();

        for id in candidate_ids {
            if groups.len() >= self.config.max_duplicate_results {
                break;
            }
            if assigned.contains(id) {
                continue;
            }
            let Some((vector, _, content)) = self.search.get(id).await else {
                continue;
            };
            if content.len() < self.config.min_content_len {
                continue;
            }

            let fanout = self.config.duplicate_neighbor_fanout;
            let hits = self
                .search
                .search(&vector, fanout + 1, &HashMap::new())
                .await;

            let mut duplicates = Vec::new();
            let mut similarity_sum = 0.0f32;
            for hit in hits {
                if hit.id == *id || assigned.contains(&hit.id) {
                    continue;
                }
                if hit.score >= self.config.similarity_threshold {
                    duplicates.push(hit.id.clone());
                    similarity_sum += hit.score;
                    assigned.insert(hit.id);
                }
            }

            if !duplicates.is_empty() {
                assigned.insert(id.clone());
                let average_similarity = similarity_sum / duplicates.len() as f32;
                groups.push(DuplicateGroup {
                    primary_id: id.clone(),
                    duplicate_ids: duplicates,
                    average_similarity,
                });
            }
        }

        groups
    }

    /// Concatenates a group's content into a brand-new long-term `Memory`
    /// and indexes it, without deleting or mutating the primary or the
    /// duplicates — they remain in the repository and the search index as
    /// the source material the merge was derived from.
    pub async fn merge_duplicates(
        &self,
        repository: &dyn ElementRepository,
        group: &DuplicateGroup,
    ) -> Result<Element> {
        let primary = repository.get_by_id(&group.primary_id).await?;
        let mut merged_text = element_text(&primary).to_string();

        for duplicate_id in &group.duplicate_ids {
            let duplicate = repository.get_by_id(duplicate_id).await?;
            merged_text.push_str("\n\n--- Merged Content ---\n\n");
            merged_text.push_str(element_text(&duplicate));
        }

        let merged_id = format!("{}-merged-{}", group.primary_id, uuid::Uuid::new_v4());
        let mut merged = Memory::new(merged_id.clone(), primary.metadata().name.clone(), merged_text.clone());
        merged.metadata.extra.insert("merged_from".to_string(), group.primary_id.clone());
        merged
            .metadata
            .extra
            .insert("merged_count".to_string(), (group.duplicate_ids.len() + 1).to_string());
        merged
            .metadata
            .extra
            .insert("merged_at".to_string(), chrono::Utc::now().to_rfc3339());
        merged
            .metadata
            .extra
            .insert("source_i_id".to_string(), group.primary_id.clone());

        let element = Element::Memory(merged);
        repository.create(element.clone()).await?;
        let vector = self.search.get(&group.primary_id).await.map(|(v, _, _)| v);
        if let Some(vector) = vector {
            let _ = self
                .search
                .add(&merged_id, vector, HashMap::new(), &merged_text)
                .await;
        }

        Ok(element)
    }
}

fn element_text(elem: &Element) -> &str {
    match elem {
        Element::Memory(m) => &m.content,
        Element::Persona(c) | Element::Skill(c) | Element::Agent(c) | Element::Template(c) => &c.body,
    }
}

fn set_element_text(elem: &mut Element, text: String) {
    match elem {
        Element::Memory(m) => m.set_content(text),
        Element::Persona(c) | Element::Skill(c) | Element::Agent(c) | Element::Template(c) => {
            c.body = text;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswConfig;
    use crate::embeddings::HashingEmbeddingProvider;
    use crate::memory::Memory;
    use crate::repository::InMemoryElementRepository;

    async fn seeded_search() -> Arc<HybridSearchService<HashingEmbeddingProvider>> {
        let service = HybridSearchService::new(
            HnswConfig::default(),
            4,
            Arc::new(HashingEmbeddingProvider::new(4)),
            None,
        );
        Arc::new(service)
    }

    #[tokio::test]
    async fn groups_near_identical_vectors() {
        let search = seeded_search().await;
        search.add("a", vec![1.0, 0.0, 0.0, 0.0], HashMap::new(), "c").await.unwrap();
        search.add("b", vec![0.999, 0.001, 0.0, 0.0], HashMap::new(), "c").await.unwrap();
        search.add("z", vec![0.0, 0.0, 1.0, 0.0], HashMap::new(), "c").await.unwrap();

        let config = ConsolidationDefaults {
            similarity_threshold: 0.95,
            duplicate_neighbor_fanout: 5,
            min_content_len: 0,
            ..ConsolidationDefaults::default()
        };
        let detector = DuplicateDetector::new(search, config);
        let groups = detector
            .find_duplicates(&["a".into(), "b".into(), "z".into()])
            .await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].primary_id, "a");
        assert_eq!(groups[0].duplicate_ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn merge_duplicates_creates_new_element_and_keeps_sources() {
        let search = seeded_search().await;
        search.add("a", vec![1.0, 0.0, 0.0, 0.0], HashMap::new(), "primary text").await.unwrap();
        search.add("b", vec![0.999, 0.001, 0.0, 0.0], HashMap::new(), "dup text").await.unwrap();

        let repo = InMemoryElementRepository::new();
        repo.create(Element::Memory(Memory::new("a", "A", "primary text"))).await.unwrap();
        repo.create(Element::Memory(Memory::new("b", "B", "dup text"))).await.unwrap();

        let detector = DuplicateDetector::new(search, ConsolidationDefaults::default());
        let group = DuplicateGroup {
            primary_id: "a".into(),
            duplicate_ids: vec!["b".into()],
            average_similarity: 0.99,
        };
        let merged = detector.merge_duplicates(&repo, &group).await.unwrap();
        assert!(element_text(&merged).contains("--- Merged Content ---"));
        assert_ne!(merged.id(), "a");
        assert_ne!(merged.id(), "b");

        assert!(repo.get_by_id("a").await.is_ok());
        assert!(repo.get_by_id("b").await.is_ok());
        let stored = repo.get_by_id(merged.id()).await.unwrap();
        assert_eq!(stored.metadata().extra.get("merged_from").map(String::as_str), Some("a"));
        assert_eq!(stored.metadata().extra.get("merged_count").map(String::as_str), Some("2"));
        assert!(stored.metadata().extra.contains_key("merged_at"));
        assert_eq!(stored.metadata().extra.get("source_i_id").map(String::as_str), Some("a"));
    }
}
