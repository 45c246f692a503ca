//! Vector storage backends: an exhaustive flat scan and an approximate HNSW
//! graph, composed by [`crate::search::HybridSearchService`].

pub mod flat;
pub mod hnsw;

pub use flat::{FlatEntry, FlatVectorStore, ScoredHit};
pub use hnsw::{HnswGraph, HnswHit, HnswParams, HnswStatistics};
