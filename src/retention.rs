//! Retention service: periodically scores every element and archives or
//! deletes the ones that fall below policy thresholds. Archival marks an
//! element rather than moving it to cold storage, since persistent storage
//! is a collaborator this core doesn't own (see [`crate::repository`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::consolidation::quality_score;
use crate::element::{Element, ElementLike};
use crate::embeddings::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::repository::{ElementRepository, ListFilter};
use crate::search::HybridSearchService;

/// One quality tier's age gates. Tiers are selected by the highest
/// `min_quality` a score still clears; `archive_after_days` must be reached
/// before `retention_days` makes sense as a policy (not enforced, the
/// caller's responsibility when building the tier list).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub min_quality: f32,
    pub archive_after_days: i64,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionAction {
    Keep,
    Archive,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionDecision {
    pub id: String,
    pub score: f32,
    pub action: RetentionAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionReport {
    pub scanned: usize,
    pub archived: Vec<String>,
    pub deleted: Vec<String>,
    pub decisions: Vec<RetentionDecision>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetentionStats {
    pub scans_run: u64,
    pub archived_total: u64,
    pub deleted_total: u64,
    pub average_quality_score: f32,
}

struct SweepHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

struct StatsInner {
    scans_run: u64,
    archived_total: u64,
    deleted_total: u64,
    average_quality_score: f32,
    scored_count: u64,
}

pub struct RetentionService<E: EmbeddingProvider> {
    repository: Arc<dyn ElementRepository>,
    search: Arc<HybridSearchService<E>>,
    config: RetentionConfig,
    stats: SyncMutex<StatsInner>,
    scans_run_atomic: AtomicU64,
    sweeper: SyncMutex<Option<SweepHandle>>,
}

impl<E: EmbeddingProvider + 'static> RetentionService<E> {
    #[must_use]
    pub fn new(repository: Arc<dyn ElementRepository>, search: Arc<HybridSearchService<E>>, config: RetentionConfig) -> Self {
        Self {
            repository,
            search,
            config,
            stats: SyncMutex::new(StatsInner {
                scans_run: 0,
                archived_total: 0,
                deleted_total: 0,
                average_quality_score: 0.0,
                scored_count: 0,
            }),
            scans_run_atomic: AtomicU64::new(0),
            sweeper: SyncMutex::new(None),
        }
    }

    fn score_element(elem: &Element) -> f32 {
        let content_len = elem.searchable_text().len();
        let tag_count = elem.metadata().tags.len();
        let age_days = (chrono::Utc::now() - elem.metadata().updated_at).num_seconds() as f64 / 86400.0;
        quality_score(content_len, tag_count, age_days.max(0.0))
    }

    /// Selects the tier with the highest `min_quality` the score still
    /// clears, then gates on age within that tier. Returns
    /// `Error::PolicyConflict` if no tier's `min_quality` is low enough.
    fn classify(&self, score: f32, age_days: f64) -> Result<RetentionAction> {
        let policy = self
            .config
            .policies
            .iter()
            .filter(|p| score >= p.min_quality)
            .max_by(|a, b| a.min_quality.total_cmp(&b.min_quality))
            .ok_or(Error::PolicyConflict(score))?;

        if age_days >= policy.retention_days as f64 {
            Ok(RetentionAction::Delete)
        } else if age_days >= policy.archive_after_days as f64 {
            Ok(RetentionAction::Archive)
        } else {
            Ok(RetentionAction::Keep)
        }
    }

    /// One scan pass over the whole repository. Checked for cancellation
    /// between elements so a long scan can be interrupted promptly. An
    /// element whose score matches no policy tier is logged and skipped,
    /// not fatal to the rest of the scan.
    pub async fn run_cleanup(&self, cancellation: &CancellationToken) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();
        let elements = self.repository.list(ListFilter::default()).await?;
        report.scanned = elements.len();

        for mut elem in elements {
            if cancellation.is_cancelled() {
                break;
            }
            let score = Self::score_element(&elem);
            let age_days = (chrono::Utc::now() - elem.metadata().updated_at).num_seconds() as f64 / 86400.0;
            let id = elem.id().to_string();

            let action = match self.classify(score, age_days) {
                Ok(action) => action,
                Err(Error::PolicyConflict(score)) => {
                    warn!(id = %id, score, "no retention policy matches quality score, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match action {
                RetentionAction::Keep => {}
                RetentionAction::Archive => {
                    elem.metadata_mut().extra.insert("archived".to_string(), "true".to_string());
                    elem.metadata_mut()
                        .extra
                        .insert("archived_at".to_string(), chrono::Utc::now().to_rfc3339());
                    self.repository.update(elem).await?;
                    report.archived.push(id.clone());
                }
                RetentionAction::Delete => {
                    self.repository.delete(&id).await?;
                    let _ = self.search.delete(&id).await;
                    report.deleted.push(id.clone());
                }
            }
            report.decisions.push(RetentionDecision { id, score, action });
        }

        self.record_scan(&report);
        Ok(report)
    }

    fn record_scan(&self, report: &RetentionReport) {
        let mut stats = self.stats.lock();
        stats.scans_run += 1;
        stats.archived_total += report.archived.len() as u64;
        stats.deleted_total += report.deleted.len() as u64;
        for decision in &report.decisions {
            stats.scored_count += 1;
            stats.average_quality_score +=
                (decision.score - stats.average_quality_score) / stats.scored_count as f32;
        }
        debug!(
            archived = report.archived.len(),
            deleted = report.deleted.len(),
            "retention scan complete"
        );
    }

    #[must_use]
    pub fn stats(&self) -> RetentionStats {
        let stats = self.stats.lock();
        RetentionStats {
            scans_run: stats.scans_run,
            archived_total: stats.archived_total,
            deleted_total: stats.deleted_total,
            average_quality_score: stats.average_quality_score,
        }
    }

    /// Starts the periodic scan loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let interval = self.config.scan_interval;
        let service = Arc::clone(self);
        let child_token = token.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = child_token.cancelled() => break,
                    _ = ticker.tick() => {
                        match service.run_cleanup(&child_token).await {
                            Ok(report) => info!(
                                archived = report.archived.len(),
                                deleted = report.deleted.len(),
                                "scheduled retention scan complete"
                            ),
                            Err(e) => tracing::warn!(error = %e, "retention scan failed"),
                        }
                    }
                }
            }
        });
        *guard = Some(SweepHandle { token, join });
    }

    /// Stops the periodic scan loop. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.token.cancel();
            handle.join.abort();
        }
    }
}

impl<E: EmbeddingProvider> Drop for RetentionService<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.token.cancel();
            handle.join.abort();
        }
    }
}
