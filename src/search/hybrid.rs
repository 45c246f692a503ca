//! Hybrid search: a [`FlatVectorStore`] as the source of truth, backed by an
//! [`HnswGraph`] mirror once the collection crosses the switchover size.
//! Below the threshold the flat scan is cheap enough that building a graph
//! buys nothing; above it, HNSW is the one that actually gets queried.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::HnswConfig;
use crate::element::Vector;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::search::cache::{EmbeddingCache, ResultCache};
use crate::vector::{FlatVectorStore, HnswGraph, HnswParams, ScoredHit};

/// Snapshot of how the service is currently answering queries, surfaced for
/// diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Flat,
    Hnsw,
}

pub struct HybridSearchService<E: EmbeddingProvider> {
    flat: RwLock<FlatVectorStore>,
    hnsw: RwLock<HnswGraph>,
    embeddings: Arc<E>,
    config: HnswConfig,
    result_cache: ResultCache,
    embedding_cache: EmbeddingCache,
    inserts_since_save: AtomicU64,
    snapshot_path: Option<PathBuf>,
}

impl<E: EmbeddingProvider> HybridSearchService<E> {
    #[must_use]
    pub fn new(config: HnswConfig, dimensions: usize, embeddings: Arc<E>, snapshot_path: Option<PathBuf>) -> Self {
        let hnsw_params = HnswParams {
            dimensions,
            m: config.m,
            ef_construction: config.ef_construction,
            ef_search: config.ef_search,
        };
        Self {
            flat: RwLock::new(FlatVectorStore::new()),
            hnsw: RwLock::new(HnswGraph::new(hnsw_params)),
            embeddings,
            config,
            result_cache: ResultCache::new(
                crate::constants::search::RESULT_CACHE_CAPACITY,
                crate::constants::relationship::CACHE_TTL,
            ),
            embedding_cache: EmbeddingCache::new(
                crate::constants::search::EMBEDDING_CACHE_CAPACITY,
                crate::constants::relationship::CACHE_TTL,
            ),
            inserts_since_save: AtomicU64::new(0),
            snapshot_path,
        }
    }

    /// Embeds `content` through the provider, consulting the embedding cache
    /// first.
    pub async fn embed_cached(&self, content: &str) -> Result<Vector> {
        if let Some(cached) = self.embedding_cache.get(content) {
            return Ok(cached);
        }
        let vector = self.embeddings.embed(content).await?;
        self.embedding_cache.put(content, vector.clone());
        Ok(vector)
    }

    /// Indexes an element's vector into the flat store, mirroring into HNSW
    /// once the collection has crossed the switchover threshold.
    pub async fn add(
        &self,
        id: impl Into<String>,
        vector: Vector,
        metadata: HashMap<String, String>,
        content: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        let content = content.into();
        {
            let mut flat = self.flat.write().await;
            flat.add(id.clone(), vector.clone(), metadata, content)?;
        }

        let should_mirror = {
            let flat = self.flat.read().await;
            flat.size() >= self.config.switchover_size
        };
        if should_mirror {
            let mut hnsw = self.hnsw.write().await;
            if hnsw.size() == 0 {
                drop(hnsw);
                self.rebuild_index().await?;
            } else {
                match hnsw.insert(id, vector) {
                    Ok(()) => {}
                    Err(crate::error::Error::DuplicateId(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        self.result_cache.invalidate_all();
        let count = self.inserts_since_save.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.config.auto_save_every_n_inserts == 0 {
            if let Some(path) = self.snapshot_path.clone() {
                self.save_index_background(path);
            }
        }
        Ok(())
    }

    /// Fire-and-forget autosave; failures are logged, never propagated, since
    /// the in-memory index remains authoritative either way.
    fn save_index_background(&self, path: PathBuf) {
        let hnsw = &self.hnsw;
        // Safety/lifetime note: this runs synchronously on the caller's task
        // rather than spawning, since `hnsw` is borrowed from `&self` and the
        // service has no `'static` handle to hand to `tokio::spawn`. Callers
        // that want a truly detached autosave should wrap the service in an
        // `Arc` and spawn from there.
        if let Ok(guard) = hnsw.try_read() {
            if let Err(e) = guard.save(&path) {
                warn!(error = %e, path = %path.display(), "autosave of HNSW snapshot failed");
            } else {
                debug!(path = %path.display(), "autosaved HNSW snapshot");
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        {
            let mut flat = self.flat.write().await;
            flat.delete(id)?;
        }
        {
            let mut hnsw = self.hnsw.write().await;
            let _ = hnsw.delete(id);
        }
        self.result_cache.invalidate_all();
        Ok(())
    }

    #[must_use]
    pub async fn backend(&self) -> SearchBackend {
        let flat_size = self.flat.read().await.size();
        let hnsw_size = self.hnsw.read().await.size();
        if flat_size >= self.config.switchover_size && hnsw_size > 0 {
            SearchBackend::Hnsw
        } else {
            SearchBackend::Flat
        }
    }

    /// Exhaustive or approximate top-`k` search, as the switchover dictates.
    /// Metadata filters always force the exhaustive flat path, since the
    /// HNSW mirror carries no metadata.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        filters: &HashMap<String, String>,
    ) -> Vec<ScoredHit> {
        let filter_key = filter_signature(filters);
        let cache_key = ResultCache::signature(query, k, &filter_key);
        if let Some(hit) = self.result_cache.get(cache_key) {
            return hit;
        }

        let use_hnsw = filters.is_empty() && self.backend().await == SearchBackend::Hnsw;
        let results = if use_hnsw {
            let hnsw = self.hnsw.read().await;
            hnsw.search_knn(query, k)
                .into_iter()
                .map(|h| ScoredHit {
                    id: h.id,
                    score: 1.0 - h.distance,
                })
                .collect()
        } else {
            let flat = self.flat.read().await;
            flat.search(query, k, filters)
        };

        self.result_cache.put(cache_key, results.clone());
        results
    }

    /// Forces a graph search at the caller's chosen `ef_search`, bypassing
    /// both the result cache and the flat/HNSW switchover decision. Used by
    /// callers that need a specific recall/latency tradeoff for one query
    /// rather than the service's configured default.
    pub async fn search_with_hnsw(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<ScoredHit> {
        let hnsw = self.hnsw.read().await;
        hnsw.search(query, k, ef_search)
            .into_iter()
            .map(|h| ScoredHit {
                id: h.id,
                score: 1.0 - h.distance,
            })
            .collect()
    }

    /// Rebuilds the HNSW mirror from scratch off the flat store's current
    /// contents. Used after the switchover threshold is first crossed and
    /// whenever recall has degraded from accumulated deletes.
    pub async fn rebuild_index(&self) -> Result<()> {
        let flat = self.flat.read().await;
        let entries: Vec<(String, Vector)> = flat
            .get_all()
            .into_iter()
            .map(|(id, e)| (id.clone(), e.vector.clone()))
            .collect();
        drop(flat);

        let mut hnsw = self.hnsw.write().await;
        hnsw.clear();
        for (id, vector) in entries {
            hnsw.insert(id, vector)?;
        }
        info!(nodes = hnsw.size(), "rebuilt HNSW index from flat store");
        drop(hnsw);
        self.result_cache.invalidate_all();
        Ok(())
    }

    pub async fn save_index(&self, path: impl Into<PathBuf>) -> Result<()> {
        let hnsw = self.hnsw.read().await;
        hnsw.save(path.into())
    }

    pub async fn load_index(&self, path: impl Into<PathBuf>) -> Result<()> {
        let mut hnsw = self.hnsw.write().await;
        hnsw.load(path.into())?;
        drop(hnsw);
        self.result_cache.invalidate_all();
        Ok(())
    }

    pub async fn size(&self) -> usize {
        self.flat.read().await.size()
    }

    /// Looks up a previously-added vector/content pair by id.
    pub async fn get(&self, id: &str) -> Option<(Vector, HashMap<String, String>, String)> {
        let flat = self.flat.read().await;
        flat.get_by_id(id)
            .map(|e| (e.vector.clone(), e.metadata.clone(), e.content.clone()))
    }

    /// All currently-indexed ids, for callers (duplicate detection,
    /// clustering) that need to iterate the whole collection.
    pub async fn all_ids(&self) -> Vec<String> {
        let flat = self.flat.read().await;
        flat.get_all().into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn clear(&self) {
        self.flat.write().await.clear();
        self.hnsw.write().await.clear();
        self.result_cache.invalidate_all();
        self.embedding_cache.invalidate_all();
        self.inserts_since_save.store(0, Ordering::Relaxed);
    }
}

fn filter_signature(filters: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = filters.iter().collect();
    pairs.sort_by_key(|(k, _)| k.as_str());
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
