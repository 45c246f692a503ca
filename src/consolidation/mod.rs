//! Memory consolidation: duplicate detection, clustering, and the
//! orchestrator that ties both together with knowledge extraction.

pub mod clustering;
pub mod duplicate;
pub mod orchestrator;

pub use clustering::{Cluster, ClusterPoint};
pub use duplicate::{DuplicateDetector, DuplicateGroup};
pub use orchestrator::{
    quality_score, ClusterAlgorithm, ConsolidationOptions, ConsolidationReport,
    MemoryConsolidationOrchestrator, MergeRecommendation,
};
