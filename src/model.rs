//! Domain types shared by the watcher, the ingestion pipeline and the
//! reconciliation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of bytes in one GiB.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// A feed entry that links to a release page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub link: String,
    pub published: DateTime<Utc>,
}

// ============================================================================
// Download queue
// ============================================================================

/// Lifecycle state reported by the download client.
///
/// qBittorrent 5 renamed `pausedDL`/`pausedUP` to `stoppedDL`/`stoppedUP`;
/// both spellings map onto the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DownloadState {
    #[serde(rename = "stoppedDL", alias = "pausedDL")]
    StoppedDownload,
    #[serde(rename = "stoppedUP", alias = "pausedUP")]
    StoppedUpload,
    #[serde(rename = "queuedDL")]
    QueuedDownload,
    #[serde(rename = "downloading")]
    Downloading,
    #[serde(rename = "stalledDL")]
    StalledDownload,
    #[serde(rename = "metaDL")]
    FetchingMetadata,
    #[serde(rename = "checkingDL")]
    Checking,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "stalledUP")]
    StalledUpload,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "missingFiles")]
    MissingFiles,
    #[serde(other)]
    Other,
}

/// One entry of the download queue, as listed by the download client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueuedDownload {
    #[serde(rename = "hash")]
    pub id: String,
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// Fraction completed, in `[0, 1]`.
    pub progress: f64,
    pub state: DownloadState,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub category: String,
}

impl QueuedDownload {
    /// Size in GiB, for log output.
    pub fn size_gib(&self) -> f64 {
        self.size_bytes as f64 / GIB as f64
    }

    /// Whether this entry carries both the tag and the category in `markers`.
    ///
    /// `tags` is a comma-separated list; the marker tag must be one of its items.
    pub fn has_markers(&self, markers: &QueueMarkers) -> bool {
        self.category == markers.category
            && self.tags.split(',').any(|t| t.trim() == markers.tag)
    }

    /// Part of the idle filtered view: marked, not started, nothing downloaded.
    pub fn is_idle(&self, markers: &QueueMarkers) -> bool {
        self.progress == 0.0
            && self.state == DownloadState::StoppedDownload
            && self.has_markers(markers)
    }
}

/// Tag and category stamped on every download this system submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMarkers {
    pub tag: String,
    pub category: String,
}

/// An action the download client can apply to a set of queue entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Start,
    Delete { delete_files: bool },
}

impl QueueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Start => "start",
            QueueAction::Delete { .. } => "delete",
        }
    }
}

/// A reconciliation verdict for one queue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub download: QueuedDownload,
    pub action: QueueAction,
    pub reason: &'static str,
}

// ============================================================================
// Media catalog
// ============================================================================

/// A movie record held by the media catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub year: u16,
    /// TMDb id.
    pub catalog_id: u64,
    pub has_file: bool,
    pub slug: Option<String>,
    /// Artwork as reported by the catalog, sent back unchanged on registration.
    pub images: Vec<CatalogImage>,
}

/// One artwork record (poster, fanart, ...) of a catalog movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogImage {
    pub cover_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

/// Result of registering a movie with the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}
