//! Per-component configuration structs, aggregated into one
//! [`MemoryEngineConfig`] a caller can construct once and hand to each
//! component's constructor — mirrors the teacher's `constants::defaults` +
//! per-module `*Config` split.

use crate::constants::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub switchover_size: usize,
    pub auto_save_every_n_inserts: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: search::DEFAULT_M,
            ef_construction: search::DEFAULT_EF_CONSTRUCTION,
            ef_search: search::DEFAULT_EF_SEARCH,
            switchover_size: search::HNSW_SWITCHOVER_SIZE,
            auto_save_every_n_inserts: search::AUTO_SAVE_EVERY_N_INSERTS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkingMemoryConfig {
    pub ttl_low: Duration,
    pub ttl_medium: Duration,
    pub ttl_high: Duration,
    pub ttl_critical: Duration,
    pub promote_threshold_low: u32,
    pub promote_threshold_medium: u32,
    pub promote_threshold_high: u32,
    pub promote_threshold_critical: u32,
    /// Minimum entry age required before promotion, per priority. The spec
    /// names this gate but doesn't fix values; zero for every tier means the
    /// access-count threshold alone decides, which matches this core's
    /// default of promoting as soon as an entry earns enough accesses.
    pub promote_min_age_low: Duration,
    pub promote_min_age_medium: Duration,
    pub promote_min_age_high: Duration,
    pub promote_min_age_critical: Duration,
    pub cleanup_interval: Duration,
    pub session_idle_ttl: Duration,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        use working_memory::*;
        Self {
            ttl_low: TTL_LOW,
            ttl_medium: TTL_MEDIUM,
            ttl_high: TTL_HIGH,
            ttl_critical: TTL_CRITICAL,
            promote_threshold_low: PROMOTE_THRESHOLD_LOW,
            promote_threshold_medium: PROMOTE_THRESHOLD_MEDIUM,
            promote_threshold_high: PROMOTE_THRESHOLD_HIGH,
            promote_threshold_critical: PROMOTE_THRESHOLD_CRITICAL,
            promote_min_age_low: PROMOTE_MIN_AGE,
            promote_min_age_medium: PROMOTE_MIN_AGE,
            promote_min_age_high: PROMOTE_MIN_AGE,
            promote_min_age_critical: PROMOTE_MIN_AGE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            session_idle_ttl: DEFAULT_SESSION_IDLE_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelationshipConfig {
    pub cache_ttl: Duration,
    pub max_depth: usize,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            cache_ttl: relationship::CACHE_TTL,
            max_depth: relationship::DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsolidationDefaults {
    pub min_content_len: usize,
    pub similarity_threshold: f32,
    pub max_duplicate_results: usize,
    pub duplicate_neighbor_fanout: usize,
    pub auto_merge_confidence: f32,
    pub dbscan_epsilon: f64,
    pub dbscan_min_cluster_size: usize,
    pub kmeans_max_iterations: usize,
}

impl Default for ConsolidationDefaults {
    fn default() -> Self {
        use consolidation::*;
        Self {
            min_content_len: MIN_CONTENT_LEN,
            similarity_threshold: SIMILARITY_THRESHOLD,
            max_duplicate_results: MAX_DUPLICATE_RESULTS,
            duplicate_neighbor_fanout: DUPLICATE_NEIGHBOR_FANOUT,
            auto_merge_confidence: AUTO_MERGE_CONFIDENCE,
            dbscan_epsilon: DBSCAN_EPSILON,
            dbscan_min_cluster_size: DBSCAN_MIN_CLUSTER_SIZE,
            kmeans_max_iterations: KMEANS_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecommendationConfig {
    pub max_results: usize,
    pub cooccurrence_weight: f32,
    pub cooccurrence_min_count: usize,
    pub tag_jaccard_min: f32,
    pub tag_jaccard_weight: f32,
    pub type_heuristic_score: f32,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        use recommendation::*;
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            cooccurrence_weight: COOCCURRENCE_WEIGHT,
            cooccurrence_min_count: COOCCURRENCE_MIN_COUNT,
            tag_jaccard_min: TAG_JACCARD_MIN,
            tag_jaccard_weight: TAG_JACCARD_WEIGHT,
            type_heuristic_score: TYPE_HEURISTIC_SCORE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InferenceConfig {
    pub min_confidence: f32,
    pub require_evidence: usize,
    pub keyword_jaccard_min: f32,
    pub semantic_similarity_min: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        use inference::*;
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            require_evidence: DEFAULT_REQUIRE_EVIDENCE,
            keyword_jaccard_min: KEYWORD_JACCARD_MIN,
            semantic_similarity_min: SEMANTIC_SIMILARITY_MIN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub scan_interval: Duration,
    /// Tiers, selected by the highest `min_quality` a score still qualifies
    /// for. Must cover `[0.0, 1.0]` with no gap or a score can fail to match
    /// any tier (`Error::PolicyConflict`).
    pub policies: Vec<crate::retention::RetentionPolicy>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        use crate::retention::RetentionPolicy;
        Self {
            scan_interval: retention::SCAN_INTERVAL,
            policies: vec![
                RetentionPolicy {
                    min_quality: retention::HIGH_MIN_QUALITY,
                    archive_after_days: retention::HIGH_ARCHIVE_AFTER_DAYS,
                    retention_days: retention::HIGH_RETENTION_DAYS,
                },
                RetentionPolicy {
                    min_quality: retention::MEDIUM_MIN_QUALITY,
                    archive_after_days: retention::MEDIUM_ARCHIVE_AFTER_DAYS,
                    retention_days: retention::MEDIUM_RETENTION_DAYS,
                },
                RetentionPolicy {
                    min_quality: retention::LOW_MIN_QUALITY,
                    archive_after_days: retention::LOW_ARCHIVE_AFTER_DAYS,
                    retention_days: retention::LOW_RETENTION_DAYS,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEngineConfig {
    pub hnsw: HnswConfig,
    pub working_memory: WorkingMemoryConfig,
    pub relationship: RelationshipConfig,
    pub consolidation: ConsolidationDefaults,
    pub recommendation: RecommendationConfig,
    pub inference: InferenceConfig,
    pub retention: RetentionConfig,
}
