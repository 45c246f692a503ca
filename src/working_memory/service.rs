//! Per-session TTL store for short-lived working memory, with
//! access-driven promotion to long-term storage and a background sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WorkingMemoryConfig;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::memory::Memory;
use crate::repository::ElementRepository;
use crate::working_memory::types::{importance_score, Priority, WorkingMemoryEntry, WorkingMemoryStats};

struct SessionState {
    entries: HashMap<String, WorkingMemoryEntry>,
    last_touched: DateTime<Utc>,
}

struct SweeperHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

/// Working-memory store, keyed first by session then by entry id.
/// `repository` is the long-term collaborator `Promote` writes through;
/// `None` disables promotion (useful for tests that only exercise the TTL
/// store itself).
pub struct WorkingMemoryService {
    config: WorkingMemoryConfig,
    repository: Option<Arc<dyn ElementRepository>>,
    sessions: RwLock<HashMap<String, SessionState>>,
    expired_swept: AtomicU64,
    promotions: AtomicU64,
    next_seq: AtomicU64,
    sweeper: SyncMutex<Option<SweeperHandle>>,
}

impl WorkingMemoryService {
    #[must_use]
    pub fn new(config: WorkingMemoryConfig, repository: Option<Arc<dyn ElementRepository>>) -> Self {
        Self {
            config,
            repository,
            sessions: RwLock::new(HashMap::new()),
            expired_swept: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
            sweeper: SyncMutex::new(None),
        }
    }

    /// Validates non-empty `session_id`/`content`, then inserts a new entry
    /// with `importance_score` derived from priority, tag count and
    /// metadata richness.
    pub async fn add(
        &self,
        session_id: impl Into<String>,
        content: impl Into<String>,
        priority: Priority,
        tags: Vec<String>,
        metadata: HashMap<String, String>,
    ) -> Result<WorkingMemoryEntry> {
        let session_id = session_id.into();
        let content = content.into();
        if session_id.trim().is_empty() {
            return Err(Error::InvalidInput("session_id must not be empty".to_string()));
        }
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("content must not be empty".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let importance = importance_score(priority, tags.len(), metadata.len());
        let entry = WorkingMemoryEntry {
            id: id.clone(),
            session_id: session_id.clone(),
            content,
            priority,
            tags,
            access_count: 0,
            metadata,
            importance_score: importance,
            created_at: now,
            last_accessed_at: now,
            expires_at: now + chrono::Duration::from_std(priority.ttl(&self.config)).unwrap_or_default(),
            promoted_at: None,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id).or_insert_with(|| SessionState {
            entries: HashMap::new(),
            last_touched: now,
        });
        session.last_touched = now;
        session.entries.insert(id, entry.clone());
        Ok(entry)
    }

    /// Fetches an entry, bumping its access count and possibly firing
    /// promotion. Returns `None` if absent or already expired.
    pub async fn get(&self, session_id: &str, id: &str) -> Option<WorkingMemoryEntry> {
        let should_promote = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(session_id)?;
            let now = Utc::now();
            let entry = session.entries.get_mut(id)?;
            if entry.is_expired(now) {
                session.entries.remove(id);
                return None;
            }
            entry.access_count += 1;
            entry.last_accessed_at = now;
            session.last_touched = now;
            self.should_promote(entry, now)
        };

        if should_promote {
            if let Err(e) = self.promote(session_id, id).await {
                debug!(error = %e, id, "promotion attempt failed");
            }
        }

        let sessions = self.sessions.read().await;
        sessions.get(session_id)?.entries.get(id).cloned()
    }

    fn should_promote(&self, entry: &WorkingMemoryEntry, now: DateTime<Utc>) -> bool {
        if entry.is_promoted() {
            return false;
        }
        let threshold = entry.priority.promote_threshold(&self.config);
        if entry.access_count < threshold {
            return false;
        }
        let min_age = entry.priority.promote_min_age(&self.config);
        entry.age(now) >= chrono::Duration::from_std(min_age).unwrap_or_default()
    }

    /// `List(sessionID, includeExpired, includePromoted)`: never errors for
    /// an unknown session (empty list). Deterministic by insertion order.
    pub async fn list(&self, session_id: &str, include_expired: bool, include_promoted: bool) -> Vec<WorkingMemoryEntry> {
        let sessions = self.sessions.read().await;
        let now = Utc::now();
        let mut entries: Vec<WorkingMemoryEntry> = sessions
            .get(session_id)
            .map(|s| {
                s.entries
                    .values()
                    .filter(|e| include_expired || !e.is_expired(now))
                    .filter(|e| include_promoted || !e.is_promoted())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    pub async fn extend_ttl(&self, session_id: &str, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        let entry = session
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let extra = entry.priority.ttl(&self.config);
        entry.expires_at += chrono::Duration::from_std(extra).unwrap_or_default();
        Ok(())
    }

    /// Explicit, immediate removal — distinct from TTL-driven sweep expiry.
    pub async fn expire_memory(&self, session_id: &str, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        let entry = session
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.expires_at = Utc::now() - chrono::Duration::seconds(1);
        Ok(())
    }

    /// Idempotent: if the entry was already promoted, returns the existing
    /// long-term memory unchanged. Otherwise copies content, tags and
    /// metadata into a new long-term [`Memory`] (reusing the working-memory
    /// entry's id), annotated with `{promoted_from, promoted_at,
    /// access_count, importance_score}`, writes it through the repository,
    /// then records `promoted_at` on the working entry.
    pub async fn promote(&self, session_id: &str, id: &str) -> Result<Element> {
        let repository = self
            .repository
            .as_ref()
            .ok_or_else(|| Error::Repository("working memory service has no repository configured".to_string()))?;

        if let Ok(existing) = repository.get_by_id(id).await {
            return Ok(existing);
        }

        let snapshot = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
            session
                .entries
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))?
        };

        let mut memory = Memory::new(snapshot.id.clone(), snapshot.id.clone(), snapshot.content.clone());
        memory.metadata.tags = snapshot.tags.clone();
        let promoted_at = Utc::now();
        memory
            .metadata
            .extra
            .insert("promoted_from".to_string(), session_id.to_string());
        memory
            .metadata
            .extra
            .insert("promoted_at".to_string(), promoted_at.to_rfc3339());
        memory
            .metadata
            .extra
            .insert("access_count".to_string(), snapshot.access_count.to_string());
        memory
            .metadata
            .extra
            .insert("importance_score".to_string(), snapshot.importance_score.to_string());
        for (k, v) in &snapshot.metadata {
            memory.metadata.extra.insert(k.clone(), v.clone());
        }

        let element = Element::Memory(memory);
        match repository.create(element.clone()).await {
            Ok(()) => {}
            Err(Error::DuplicateId(_)) => {
                return repository.get_by_id(id).await;
            }
            Err(e) => return Err(e),
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            if let Some(entry) = session.entries.get_mut(id) {
                entry.promoted_at = Some(promoted_at);
            }
        }
        self.promotions.fetch_add(1, Ordering::Relaxed);
        debug!(id, "promoted working memory entry to long-term storage");

        Ok(element)
    }

    pub async fn clear_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn export_session(&self, session_id: &str) -> Vec<WorkingMemoryEntry> {
        self.list(session_id, true, true).await
    }

    pub async fn stats(&self, session_id: &str) -> WorkingMemoryStats {
        let sessions = self.sessions.read().await;
        let now = Utc::now();
        let Some(session) = sessions.get(session_id) else {
            return WorkingMemoryStats::default();
        };

        let total = session.entries.len();
        let expired = session.entries.values().filter(|e| e.is_expired(now)).count();
        let promoted = session.entries.values().filter(|e| e.is_promoted()).count();
        let active = total - expired;

        let access_sum: u32 = session.entries.values().map(|e| e.access_count).sum();
        let importance_sum: f32 = session.entries.values().map(|e| e.importance_score).sum();
        let avg_access_count = if total == 0 { 0.0 } else { access_sum as f32 / total as f32 };
        let avg_importance = if total == 0 { 0.0 } else { importance_sum / total as f32 };

        WorkingMemoryStats {
            total,
            active,
            expired,
            promoted,
            avg_access_count,
            avg_importance,
        }
    }

    /// Removes entries that are both expired and not promoted, then any
    /// session left empty and idle past `session_idle_ttl`. Returns the
    /// number of entries removed.
    pub async fn sweep_once(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let mut removed = 0usize;

        sessions.retain(|_, session| {
            let before = session.entries.len();
            session.entries.retain(|_, e| !e.is_expired(now) || e.is_promoted());
            removed += before - session.entries.len();

            let idle = now.signed_duration_since(session.last_touched);
            let idle_limit = chrono::Duration::from_std(self.config.session_idle_ttl).unwrap_or_default();
            !(session.entries.is_empty() && idle > idle_limit)
        });

        if removed > 0 {
            self.expired_swept.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Starts the background sweep loop. Idempotent: a second call while a
    /// sweeper is already running is a no-op.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let interval = self.config.cleanup_interval;
        let service = Arc::clone(self);
        let child_token = token.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = child_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let n = service.sweep_once().await;
                        if n > 0 {
                            info!(removed = n, "working memory sweep removed expired entries");
                        }
                    }
                }
            }
        });
        *guard = Some(SweeperHandle { token, join });
    }

    /// Stops the background sweep loop. Idempotent.
    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.token.cancel();
            handle.join.abort();
        }
    }
}

impl Drop for WorkingMemoryService {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementLike;
    use crate::repository::InMemoryElementRepository;

    fn config() -> WorkingMemoryConfig {
        WorkingMemoryConfig {
            ttl_low: std::time::Duration::from_secs(3600),
            promote_threshold_low: 2,
            ..WorkingMemoryConfig::default()
        }
    }

    #[tokio::test]
    async fn add_then_get_increments_access_count() {
        let service = WorkingMemoryService::new(config(), None);
        let entry = service.add("s1", "hello", Priority::Low, vec![], HashMap::new()).await.unwrap();
        let fetched = service.get("s1", &entry.id).await.unwrap();
        assert_eq!(fetched.access_count, 1);
    }

    #[tokio::test]
    async fn add_rejects_empty_session_or_content() {
        let service = WorkingMemoryService::new(config(), None);
        assert!(service.add("", "hello", Priority::Low, vec![], HashMap::new()).await.is_err());
        assert!(service.add("s1", "  ", Priority::Low, vec![], HashMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn repeated_access_promotes_to_long_term_memory() {
        let repo = Arc::new(InMemoryElementRepository::new());
        let service = WorkingMemoryService::new(config(), Some(repo.clone() as Arc<dyn ElementRepository>));
        let entry = service.add("s1", "hello", Priority::Low, vec![], HashMap::new()).await.unwrap();

        service.get("s1", &entry.id).await;
        let fetched = service.get("s1", &entry.id).await.unwrap();
        assert!(fetched.is_promoted());
        assert_eq!(service.stats("s1").await.promoted, 1);

        let promoted = repo.get_by_id(&entry.id).await.unwrap();
        assert_eq!(promoted.id(), entry.id);
        match promoted {
            Element::Memory(m) => {
                assert_eq!(m.content, "hello");
                assert_eq!(m.metadata.extra.get("promoted_from").map(String::as_str), Some("s1"));
                assert!(m.metadata.extra.contains_key("promoted_at"));
            }
            _ => panic!("expected a memory element"),
        }
    }

    #[tokio::test]
    async fn promote_is_idempotent() {
        let repo = Arc::new(InMemoryElementRepository::new());
        let service = WorkingMemoryService::new(config(), Some(repo.clone() as Arc<dyn ElementRepository>));
        let entry = service.add("s1", "hello", Priority::Critical, vec![], HashMap::new()).await.unwrap();

        let first = service.promote("s1", &entry.id).await.unwrap();
        let second = service.promote("s1", &entry.id).await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(repo.list(Default::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn promote_without_repository_fails() {
        let service = WorkingMemoryService::new(config(), None);
        let entry = service.add("s1", "hello", Priority::Critical, vec![], HashMap::new()).await.unwrap();
        assert!(service.promote("s1", &entry.id).await.is_err());
    }

    #[tokio::test]
    async fn expire_memory_removes_entry_immediately() {
        let service = WorkingMemoryService::new(config(), None);
        let entry = service.add("s1", "hello", Priority::Low, vec![], HashMap::new()).await.unwrap();
        service.expire_memory("s1", &entry.id).await.unwrap();
        assert!(service.get("s1", &entry.id).await.is_none());
    }

    #[tokio::test]
    async fn clear_session_drops_all_entries() {
        let service = WorkingMemoryService::new(config(), None);
        service.add("s1", "a", Priority::Low, vec![], HashMap::new()).await.unwrap();
        service.add("s1", "b", Priority::Low, vec![], HashMap::new()).await.unwrap();
        service.clear_session("s1").await;
        assert!(service.list("s1", true, true).await.is_empty());
    }

    #[tokio::test]
    async fn list_excludes_expired_and_promoted_by_default() {
        let repo = Arc::new(InMemoryElementRepository::new());
        let service = WorkingMemoryService::new(config(), Some(repo as Arc<dyn ElementRepository>));
        let entry = service.add("s1", "hello", Priority::Critical, vec![], HashMap::new()).await.unwrap();
        service.promote("s1", &entry.id).await.unwrap();

        assert!(service.list("s1", false, false).await.is_empty());
        assert_eq!(service.list("s1", false, true).await.len(), 1);
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries() {
        let mut cfg = config();
        cfg.ttl_low = std::time::Duration::from_millis(1);
        let service = WorkingMemoryService::new(cfg, None);
        service.add("s1", "a", Priority::Low, vec![], HashMap::new()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let removed = service.sweep_once().await;
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn sweep_never_removes_promoted_entries_even_if_expired() {
        let repo = Arc::new(InMemoryElementRepository::new());
        let mut cfg = config();
        cfg.ttl_low = std::time::Duration::from_millis(1);
        let service = WorkingMemoryService::new(cfg, Some(repo as Arc<dyn ElementRepository>));
        let entry = service.add("s1", "a", Priority::Low, vec![], HashMap::new()).await.unwrap();
        service.promote("s1", &entry.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let removed = service.sweep_once().await;
        assert_eq!(removed, 0);
    }
}
