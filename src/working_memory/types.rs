//! Entry and priority types for the working-memory TTL store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Importance tier. Fixed for an entry's lifetime — it only selects the
/// entry's TTL and the access-count threshold that gates promotion to
/// long-term storage, it never changes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub fn ttl(self, config: &crate::config::WorkingMemoryConfig) -> Duration {
        match self {
            Priority::Low => config.ttl_low,
            Priority::Medium => config.ttl_medium,
            Priority::High => config.ttl_high,
            Priority::Critical => config.ttl_critical,
        }
    }

    /// Access count, at this priority, that clears the promotion gate.
    /// Coarsens with lower priority: critical=1, high=3, medium=5, low=10.
    #[must_use]
    pub fn promote_threshold(self, config: &crate::config::WorkingMemoryConfig) -> u32 {
        match self {
            Priority::Low => config.promote_threshold_low,
            Priority::Medium => config.promote_threshold_medium,
            Priority::High => config.promote_threshold_high,
            Priority::Critical => config.promote_threshold_critical,
        }
    }

    /// Minimum entry age required before promotion, at this priority.
    #[must_use]
    pub fn promote_min_age(self, config: &crate::config::WorkingMemoryConfig) -> Duration {
        match self {
            Priority::Low => config.promote_min_age_low,
            Priority::Medium => config.promote_min_age_medium,
            Priority::High => config.promote_min_age_high,
            Priority::Critical => config.promote_min_age_critical,
        }
    }
}

/// A single item held in a session's working memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryEntry {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub access_count: u32,
    pub metadata: HashMap<String, String>,
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub promoted_at: Option<DateTime<Utc>>,
    /// Insertion sequence, for deterministic `List` ordering.
    pub(crate) seq: u64,
}

impl WorkingMemoryEntry {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_promoted(&self) -> bool {
        self.promoted_at.is_some()
    }

    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Importance from priority, tag richness and metadata richness, each
/// contributing up to a third of the total, capped at 1.0.
#[must_use]
pub fn importance_score(priority: Priority, tag_count: usize, metadata_count: usize) -> f32 {
    let priority_score = match priority {
        Priority::Low => 0.25,
        Priority::Medium => 0.5,
        Priority::High => 0.75,
        Priority::Critical => 1.0,
    };
    let tag_score = (tag_count as f32 / 5.0).min(1.0);
    let metadata_score = (metadata_count as f32 / 5.0).min(1.0);
    ((priority_score + tag_score + metadata_score) / 3.0).min(1.0)
}

/// Aggregate counters reported by [`super::service::WorkingMemoryService::stats`],
/// scoped to one session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkingMemoryStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub promoted: usize,
    pub avg_access_count: f32,
    pub avg_importance: f32,
}
