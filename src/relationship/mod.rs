//! Explicit relationship graph plus heuristic relationship inference.

pub mod index;
pub mod inference;

pub use index::{ExpandOptions, ExpansionNode, Relationship, RelationshipIndex, RelationshipStats};
pub use inference::{InferenceCandidate, InferredRelationship, RelationshipInference};
