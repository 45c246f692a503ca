//! Ephemeral, per-session working memory with TTL expiry and promotion.

pub mod service;
pub mod types;

pub use service::WorkingMemoryService;
pub use types::{Priority, WorkingMemoryEntry, WorkingMemoryStats};
