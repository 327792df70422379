//! External collaborators: the download client, the media catalog and the
//! notification channel.
//!
//! The orchestration core only sees the traits defined here. Concrete HTTP
//! clients live in the submodules:
//!
//! - [`qbittorrent`] - qBittorrent Web API v2 download queue
//! - [`radarr`] - Radarr API v3 media catalog
//! - [`ntfy`] - ntfy.sh push notifications

pub mod ntfy;
pub mod qbittorrent;
pub mod radarr;

use crate::model::{AddOutcome, CatalogEntry, QueueAction, QueueMarkers, QueuedDownload};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use ntfy::{DisabledNotifier, NtfyNotifier};
pub use qbittorrent::QbitClient;
pub use radarr::RadarrClient;

/// Errors returned by collaborator calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Session could not be established or was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// The requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its timeout
    #[error("Request timed out")]
    Timeout,
    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Per-item outcome of [`DownloadQueue::apply`], in input order.
pub type ApplyResults = Vec<(String, Result<(), ServiceError>)>;

/// The download queue service.
#[async_trait]
pub trait DownloadQueue: Send + Sync {
    /// Hand a downloaded attachment file to the queue.
    async fn add(&self, file: &Path) -> Result<(), ServiceError>;

    /// List queue entries, optionally restricted to those carrying `markers`.
    async fn list(&self, filter: Option<&QueueMarkers>)
        -> Result<Vec<QueuedDownload>, ServiceError>;

    /// Apply `action` to each id, one call per id, in order.
    async fn apply(&self, ids: &[String], action: QueueAction) -> ApplyResults;
}

/// The media catalog service.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Look a movie up by free-text title. `Ok(None)` when nothing matches.
    async fn lookup(&self, title: &str) -> Result<Option<CatalogEntry>, ServiceError>;

    /// Every movie already in the library.
    async fn list(&self) -> Result<Vec<CatalogEntry>, ServiceError>;

    /// Register a movie. Registering one that is already present is not an error.
    async fn add(&self, entry: &CatalogEntry) -> Result<AddOutcome, ServiceError>;

    /// Whether the library holds the movie and its file.
    async fn has_file(&self, catalog_id: u64) -> Result<bool, ServiceError> {
        Ok(self
            .list()
            .await?
            .iter()
            .any(|m| m.catalog_id == catalog_id && m.has_file))
    }
}

/// Best-effort push notifications. Implementations swallow their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, title: &str, message: &str, tags: &[&str]);

    async fn notify_error(&self, operation: &str, error: &str) {
        let message = format!("Operation: {}\nError: {}", operation, error);
        self.send("🚨 Automation Error", &message, &["rotating_light"])
            .await;
    }

    async fn notify_movie_added(&self, title: &str, year: u16) {
        let message = format!("{} ({})", title, year);
        self.send("🎬 New Movie Added", &message, &["movie_camera", "tamilmv"])
            .await;
    }
}
