//! In-memory collaborators shared by the integration tests.
//!
//! Each fake records what it was asked to do so tests can assert on the
//! calls, and holds just enough state to behave like the real service.
#![allow(dead_code)]

use async_trait::async_trait;
use feedarr::ingest::{IngestReport, ItemProcessor};
use feedarr::model::{
    AddOutcome, CatalogEntry, DownloadState, FeedItem, QueueAction, QueueMarkers, QueuedDownload,
    GIB,
};
use feedarr::reconcile::{Reconcile, ReconcileReport};
use feedarr::services::{ApplyResults, DownloadQueue, MediaCatalog, Notifier, ServiceError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

pub fn markers() -> QueueMarkers {
    QueueMarkers {
        tag: "tamilmv".to_string(),
        category: "radarr".to_string(),
    }
}

/// A marked, stopped, untouched download of `gib` GiB.
pub fn idle(id: &str, name: &str, gib: f64) -> QueuedDownload {
    QueuedDownload {
        id: id.to_string(),
        name: name.to_string(),
        size_bytes: (gib * GIB as f64) as u64,
        progress: 0.0,
        state: DownloadState::StoppedDownload,
        tags: "tamilmv".to_string(),
        category: "radarr".to_string(),
    }
}

pub fn movie(title: &str, year: u16, catalog_id: u64, has_file: bool) -> CatalogEntry {
    CatalogEntry {
        title: title.to_string(),
        year,
        catalog_id,
        has_file,
        slug: None,
        images: Vec::new(),
    }
}

// ============================================================================
// Download queue
// ============================================================================

/// Download queue backed by a `Vec`. Deletes remove entries, starts flip
/// them to `Downloading`.
#[derive(Default)]
pub struct FakeQueue {
    pub entries: Mutex<Vec<QueuedDownload>>,
    /// Path and contents of every file handed to `add`.
    pub added: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    pub applied: Mutex<Vec<(String, QueueAction)>>,
    pub list_calls: AtomicUsize,
    pub fail_add: AtomicBool,
    pub fail_list: AtomicBool,
    /// Ids whose actions the queue rejects.
    pub rejected_ids: Mutex<HashSet<String>>,
}

impl FakeQueue {
    pub fn with_entries(entries: Vec<QueuedDownload>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub async fn ids(&self) -> Vec<String> {
        self.entries.lock().await.iter().map(|d| d.id.clone()).collect()
    }

    pub async fn applied_with(&self, action: QueueAction) -> Vec<String> {
        self.applied
            .lock()
            .await
            .iter()
            .filter(|(_, a)| *a == action)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl DownloadQueue for FakeQueue {
    async fn add(&self, file: &Path) -> Result<(), ServiceError> {
        let bytes = tokio::fs::read(file).await?;
        self.added.lock().await.push((file.to_path_buf(), bytes));
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(ServiceError::HttpStatus(415));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: Option<&QueueMarkers>,
    ) -> Result<Vec<QueuedDownload>, ServiceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ServiceError::HttpStatus(503));
        }
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|d| filter.map_or(true, |m| d.has_markers(m)))
            .cloned()
            .collect())
    }

    async fn apply(&self, ids: &[String], action: QueueAction) -> ApplyResults {
        let rejected = self.rejected_ids.lock().await.clone();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            self.applied.lock().await.push((id.clone(), action));
            if rejected.contains(id) {
                results.push((id.clone(), Err(ServiceError::HttpStatus(409))));
                continue;
            }
            let mut entries = self.entries.lock().await;
            match action {
                QueueAction::Delete { .. } => entries.retain(|d| &d.id != id),
                QueueAction::Start => {
                    for d in entries.iter_mut().filter(|d| &d.id == id) {
                        d.state = DownloadState::Downloading;
                    }
                }
            }
            results.push((id.clone(), Ok(())));
        }
        results
    }
}

// ============================================================================
// Media catalog
// ============================================================================

/// Scripted answer for one lookup term.
#[derive(Clone)]
pub enum Lookup {
    Found(CatalogEntry),
    Missing,
    Fails,
}

#[derive(Default)]
pub struct FakeCatalog {
    /// Keyed by the exact term passed to `lookup`; unknown terms are `Missing`.
    pub lookups: HashMap<String, Lookup>,
    pub library: Mutex<Vec<CatalogEntry>>,
    pub terms: Mutex<Vec<String>>,
    pub added: Mutex<Vec<CatalogEntry>>,
    pub fail_add: AtomicBool,
}

impl FakeCatalog {
    pub fn with_lookups(lookups: impl IntoIterator<Item = (&'static str, Lookup)>) -> Self {
        Self {
            lookups: lookups
                .into_iter()
                .map(|(term, answer)| (term.to_string(), answer))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MediaCatalog for FakeCatalog {
    async fn lookup(&self, title: &str) -> Result<Option<CatalogEntry>, ServiceError> {
        self.terms.lock().await.push(title.to_string());
        match self.lookups.get(title).cloned().unwrap_or(Lookup::Missing) {
            Lookup::Found(entry) => Ok(Some(entry)),
            Lookup::Missing => Ok(None),
            Lookup::Fails => Err(ServiceError::Timeout),
        }
    }

    async fn list(&self) -> Result<Vec<CatalogEntry>, ServiceError> {
        Ok(self.library.lock().await.clone())
    }

    async fn add(&self, entry: &CatalogEntry) -> Result<AddOutcome, ServiceError> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(ServiceError::HttpStatus(500));
        }
        let mut library = self.library.lock().await;
        if library.iter().any(|m| m.catalog_id == entry.catalog_id) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        library.push(entry.clone());
        self.added.lock().await.push(entry.clone());
        Ok(AddOutcome::Added)
    }
}

// ============================================================================
// Notifier, reconciler, processor
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    /// `(title, message)` pairs in send order.
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub async fn titles(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, title: &str, message: &str, _tags: &[&str]) {
        self.sent
            .lock()
            .await
            .push((title.to_string(), message.to_string()));
    }
}

#[derive(Default)]
pub struct CountingReconciler {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Reconcile for CountingReconciler {
    async fn reconcile(&self) -> ReconcileReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ReconcileReport::default()
    }
}

#[derive(Default)]
pub struct RecordingProcessor {
    pub batches: Mutex<Vec<Vec<FeedItem>>>,
}

#[async_trait]
impl ItemProcessor for RecordingProcessor {
    async fn process_new_items(&self, items: Vec<FeedItem>) -> IngestReport {
        let report = IngestReport {
            items: items.len(),
            ..IngestReport::default()
        };
        self.batches.lock().await.push(items);
        report
    }
}
