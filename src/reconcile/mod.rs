//! Queue reconciliation: the three-stage pass that prunes the download queue
//! and starts what is left.
//!
//! 1. **Size filter** - idle entries outside [`SizeBounds`] are deleted.
//! 2. **Duplicate resolution** - one canonical candidate per title survives.
//! 3. **Catalog dispatch** - idle entries already owned by the media catalog
//!    are deleted, the rest are registered with the catalog and started.
//!
//! Every stage re-reads the queue, so each one sees the effects of the stage
//! before it. A stage that cannot list the queue logs and does nothing; it
//! never aborts the stages after it.

mod select;
pub mod title;

pub use select::{
    duplicate_losers, group_by_title, select_survivor, size_violations, SizeBounds,
    REASON_DUPLICATE, REASON_SIZE,
};

use crate::model::{AddOutcome, Decision, QueueAction, QueueMarkers, QueuedDownload};
use crate::services::{DownloadQueue, MediaCatalog, Notifier, ServiceError};
use async_trait::async_trait;
use std::sync::Arc;
pub use title::{TitleParser, DEFAULT_RELEASE_MARKER};

pub const REASON_IN_CATALOG: &str = "already in catalog";
pub const REASON_REGISTERED: &str = "registered in catalog";
pub const REASON_MONITORED: &str = "already monitored";
pub const REASON_NOT_IN_CATALOG: &str = "not in catalog";

/// Anything that can run a reconciliation pass.
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self) -> ReconcileReport;
}

/// Counts of applied actions per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub size_deleted: usize,
    pub duplicates_deleted: usize,
    pub catalog_deleted: usize,
    pub started: usize,
    /// Idle entries left untouched because a catalog call failed.
    pub skipped: usize,
    /// Queue actions the download client rejected.
    pub action_failures: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub markers: QueueMarkers,
    pub bounds: SizeBounds,
    /// Turns release names into catalog search terms.
    pub titles: TitleParser,
}

#[derive(Debug, Default)]
struct Applied {
    succeeded: usize,
    failed: usize,
}

#[derive(Debug, Default)]
struct DispatchCounts {
    deleted: Applied,
    started: Applied,
    skipped: usize,
}

pub struct ReconciliationEngine {
    queue: Arc<dyn DownloadQueue>,
    catalog: Arc<dyn MediaCatalog>,
    notifier: Arc<dyn Notifier>,
    settings: ReconcileSettings,
}

impl ReconciliationEngine {
    pub fn new(
        queue: Arc<dyn DownloadQueue>,
        catalog: Arc<dyn MediaCatalog>,
        notifier: Arc<dyn Notifier>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            queue,
            catalog,
            notifier,
            settings,
        }
    }

    /// Run all three stages in order.
    pub async fn run(&self) -> ReconcileReport {
        let size = self.filter_by_size().await;
        let duplicates = self.resolve_duplicates().await;
        let dispatch = self.dispatch().await;

        let report = ReconcileReport {
            size_deleted: size.succeeded,
            duplicates_deleted: duplicates.succeeded,
            catalog_deleted: dispatch.deleted.succeeded,
            started: dispatch.started.succeeded,
            skipped: dispatch.skipped,
            action_failures: size.failed
                + duplicates.failed
                + dispatch.deleted.failed
                + dispatch.started.failed,
        };
        tracing::info!(
            size_deleted = report.size_deleted,
            duplicates_deleted = report.duplicates_deleted,
            catalog_deleted = report.catalog_deleted,
            started = report.started,
            skipped = report.skipped,
            action_failures = report.action_failures,
            "Reconciliation finished"
        );
        report
    }

    /// Marked, not-yet-started entries with nothing downloaded.
    async fn idle_view(&self) -> Result<Vec<QueuedDownload>, ServiceError> {
        let markers = &self.settings.markers;
        let entries = self.queue.list(Some(markers)).await?;
        Ok(entries.into_iter().filter(|d| d.is_idle(markers)).collect())
    }

    async fn filter_by_size(&self) -> Applied {
        let idle = match self.idle_view().await {
            Ok(idle) => idle,
            Err(e) => {
                tracing::error!(stage = "size", error = %e, "Failed to list download queue");
                return Applied::default();
            }
        };
        let decisions = size_violations(idle, self.settings.bounds);
        self.execute(QueueAction::Delete { delete_files: true }, &decisions)
            .await
    }

    async fn resolve_duplicates(&self) -> Applied {
        let markers = &self.settings.markers;
        let entries = match self.queue.list(Some(markers)).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(stage = "duplicates", error = %e, "Failed to list download queue");
                return Applied::default();
            }
        };
        let marked: Vec<_> = entries
            .into_iter()
            .filter(|d| d.has_markers(markers))
            .collect();
        let decisions = duplicate_losers(marked);
        self.execute(QueueAction::Delete { delete_files: true }, &decisions)
            .await
    }

    async fn dispatch(&self) -> DispatchCounts {
        let idle = match self.idle_view().await {
            Ok(idle) => idle,
            Err(e) => {
                tracing::error!(stage = "catalog", error = %e, "Failed to list download queue");
                return DispatchCounts::default();
            }
        };

        let mut deletes = Vec::new();
        let mut starts = Vec::new();
        let mut skipped = 0;

        for download in idle {
            match self.decide(download).await {
                Some(decision) if decision.action == QueueAction::Start => starts.push(decision),
                Some(decision) => deletes.push(decision),
                None => skipped += 1,
            }
        }

        DispatchCounts {
            deleted: self
                .execute(QueueAction::Delete { delete_files: true }, &deletes)
                .await,
            started: self.execute(QueueAction::Start, &starts).await,
            skipped,
        }
    }

    /// Catalog verdict for one idle download. `None` skips it for this run.
    async fn decide(&self, download: QueuedDownload) -> Option<Decision> {
        let name = self.settings.titles.movie_name(&download.name);

        let entry = match self.catalog.lookup(&name).await {
            Ok(Some(entry)) => entry,
            Ok(None) | Err(ServiceError::NotFound(_)) => {
                tracing::warn!(movie = %name, "Movie not found in catalog");
                return Some(Decision {
                    download,
                    action: QueueAction::Start,
                    reason: REASON_NOT_IN_CATALOG,
                });
            }
            Err(e) => {
                tracing::error!(movie = %name, error = %e, "Catalog lookup failed, skipping");
                return None;
            }
        };

        if entry.has_file {
            return Some(Decision {
                download,
                action: QueueAction::Delete { delete_files: true },
                reason: REASON_IN_CATALOG,
            });
        }

        let reason = match self.catalog.add(&entry).await {
            Ok(AddOutcome::Added) => {
                tracing::info!(title = %entry.title, year = entry.year, "Added movie to catalog");
                self.notifier
                    .notify_movie_added(&entry.title, entry.year)
                    .await;
                REASON_REGISTERED
            }
            Ok(AddOutcome::AlreadyPresent) => {
                tracing::warn!(
                    title = %entry.title,
                    year = entry.year,
                    "Movie already exists in catalog"
                );
                REASON_MONITORED
            }
            Err(e) => {
                tracing::error!(movie = %name, error = %e, "Failed to add movie to catalog, skipping");
                self.notifier
                    .notify_error("Catalog registration", &format!("Failed to add {}: {}", name, e))
                    .await;
                return None;
            }
        };

        Some(Decision {
            download,
            action: QueueAction::Start,
            reason,
        })
    }

    /// Apply one action to a batch of decisions and log each outcome.
    async fn execute(&self, action: QueueAction, decisions: &[Decision]) -> Applied {
        if decisions.is_empty() {
            return Applied::default();
        }

        let ids: Vec<String> = decisions.iter().map(|d| d.download.id.clone()).collect();
        let results = self.queue.apply(&ids, action).await;

        let mut applied = Applied::default();
        for (decision, (_, result)) in decisions.iter().zip(results) {
            let download = &decision.download;
            match result {
                Ok(()) => {
                    applied.succeeded += 1;
                    tracing::info!(
                        action = action.as_str(),
                        reason = decision.reason,
                        movie = %self.settings.titles.movie_name(&download.name),
                        size_gb = %format!("{:.2}", download.size_gib()),
                        "Applied queue action"
                    );
                }
                Err(e) => {
                    applied.failed += 1;
                    tracing::error!(
                        action = action.as_str(),
                        name = %download.name,
                        error = %e,
                        "Queue action failed"
                    );
                }
            }
        }
        applied
    }
}

#[async_trait]
impl Reconcile for ReconciliationEngine {
    async fn reconcile(&self) -> ReconcileReport {
        self.run().await
    }
}
