//! Exhaustive flat vector store: `{id -> (vector, metadata, content)}` with
//! a full scan on every search. The source of truth the HNSW graph is built
//! and rebuilt from.

use crate::element::Vector;
use crate::embeddings::cosine_similarity;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// One entry in the flat store.
#[derive(Debug, Clone)]
pub struct FlatEntry {
    pub vector: Vector,
    pub metadata: HashMap<String, String>,
    pub content: String,
}

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
}

/// Exhaustive, metadata-filterable vector store.
#[derive(Default)]
pub struct FlatVectorStore {
    entries: HashMap<String, FlatEntry>,
    dimensions: Option<usize>,
}

impl FlatVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        id: impl Into<String>,
        vector: Vector,
        metadata: HashMap<String, String>,
        content: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        match self.dimensions {
            Some(d) if d != vector.len() => {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    got: vector.len(),
                })
            }
            None => self.dimensions = Some(vector.len()),
            _ => {}
        }
        self.entries.insert(
            id,
            FlatEntry {
                vector,
                metadata,
                content: content.into(),
            },
        );
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&FlatEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn get_all(&self) -> Vec<(&String, &FlatEntry)> {
        self.entries.iter().collect()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dimensions = None;
    }

    /// Exhaustive cosine-similarity scan with equality filters on metadata.
    #[must_use]
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filters: &HashMap<String, String>,
    ) -> Vec<ScoredHit> {
        let mut scored: Vec<ScoredHit> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                filters
                    .iter()
                    .all(|(key, val)| e.metadata.get(key).is_some_and(|v| v == val))
            })
            .map(|(id, e)| ScoredHit {
                id: id.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}
