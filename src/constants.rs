//! Global defaults, centralized so the per-component `*Config` structs in
//! [`crate::config`] have a single source of truth for their numeric knobs.

use std::time::Duration;

/// HNSW / hybrid search defaults.
pub mod search {
    pub const HNSW_SWITCHOVER_SIZE: usize = 100;
    pub const DEFAULT_M: usize = 16;
    pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
    pub const DEFAULT_EF_SEARCH: usize = 50;
    pub const AUTO_SAVE_EVERY_N_INSERTS: u64 = 100;
    pub const RESULT_CACHE_CAPACITY: usize = 1_000;
    pub const EMBEDDING_CACHE_CAPACITY: usize = 1_000;
}

/// Working memory TTL-by-priority defaults.
pub mod working_memory {
    use super::Duration;

    pub const TTL_LOW: Duration = Duration::from_secs(3600);
    pub const TTL_MEDIUM: Duration = Duration::from_secs(4 * 3600);
    pub const TTL_HIGH: Duration = Duration::from_secs(12 * 3600);
    pub const TTL_CRITICAL: Duration = Duration::from_secs(24 * 3600);

    pub const PROMOTE_THRESHOLD_LOW: u32 = 10;
    pub const PROMOTE_THRESHOLD_MEDIUM: u32 = 5;
    pub const PROMOTE_THRESHOLD_HIGH: u32 = 3;
    pub const PROMOTE_THRESHOLD_CRITICAL: u32 = 1;

    /// Minimum entry age before promotion fires, uniform across tiers since
    /// the spec names the gate without fixing per-tier values.
    pub const PROMOTE_MIN_AGE: Duration = Duration::from_secs(0);

    pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(3600);
}

/// Relationship index defaults.
pub mod relationship {
    use super::Duration;

    pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_MAX_DEPTH: usize = 3;
}

/// Consolidation / duplicate-detection defaults.
pub mod consolidation {
    pub const MIN_CONTENT_LEN: usize = 20;
    pub const SIMILARITY_THRESHOLD: f32 = 0.95;
    pub const MAX_DUPLICATE_RESULTS: usize = 100;
    pub const DUPLICATE_NEIGHBOR_FANOUT: usize = 20;
    pub const AUTO_MERGE_CONFIDENCE: f32 = 0.95;

    pub const DBSCAN_EPSILON: f64 = 0.15;
    pub const DBSCAN_MIN_CLUSTER_SIZE: usize = 3;
    pub const KMEANS_MAX_ITERATIONS: usize = 100;
}

/// Recommendation engine defaults.
pub mod recommendation {
    pub const DEFAULT_MAX_RESULTS: usize = 10;
    pub const COOCCURRENCE_WEIGHT: f32 = 0.8;
    pub const COOCCURRENCE_MIN_COUNT: usize = 2;
    pub const TAG_JACCARD_MIN: f32 = 0.3;
    pub const TAG_JACCARD_WEIGHT: f32 = 0.6;
    pub const TYPE_HEURISTIC_SCORE: f32 = 0.2;
}

/// Relationship inference defaults.
pub mod inference {
    pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
    pub const DEFAULT_REQUIRE_EVIDENCE: usize = 1;
    pub const KEYWORD_JACCARD_MIN: f32 = 0.3;
    pub const SEMANTIC_SIMILARITY_MIN: f32 = 0.3;
}

/// Retention / archival defaults. Three quality tiers, each with its own
/// archive/delete age gates — richer content earns more time before either.
pub mod retention {
    use super::Duration;

    pub const SCAN_INTERVAL: Duration = Duration::from_secs(24 * 3600);

    pub const HIGH_MIN_QUALITY: f32 = 0.7;
    pub const HIGH_ARCHIVE_AFTER_DAYS: i64 = 180;
    pub const HIGH_RETENTION_DAYS: i64 = 365;

    pub const MEDIUM_MIN_QUALITY: f32 = 0.4;
    pub const MEDIUM_ARCHIVE_AFTER_DAYS: i64 = 60;
    pub const MEDIUM_RETENTION_DAYS: i64 = 120;

    pub const LOW_MIN_QUALITY: f32 = 0.0;
    pub const LOW_ARCHIVE_AFTER_DAYS: i64 = 7;
    pub const LOW_RETENTION_DAYS: i64 = 30;
}

/// Concurrency and fan-out defaults (section 5 of the spec).
pub mod concurrency {
    use super::Duration;

    pub const DEFAULT_MAX_ELEMENTS: usize = 20;
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
}
