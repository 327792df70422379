//! From new feed items to queued downloads.
//!
//! Scrapes every item's page concurrently, downloads each discovered
//! attachment into a scratch file, hands it to the download queue, and
//! finishes with one reconciliation pass.

use crate::fetch::{fetch_bytes, FetchError};
use crate::model::FeedItem;
use crate::reconcile::Reconcile;
use crate::scrape::LinkScraper;
use crate::services::{DownloadQueue, ServiceError};
use async_trait::async_trait;
use futures::future::join_all;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

const ATTACHMENT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Consumer of the items a feed poll found.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process_new_items(&self, items: Vec<FeedItem>) -> IngestReport;
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Scratch file error: {0}")]
    Scratch(#[from] std::io::Error),
    #[error("Queue rejected attachment: {0}")]
    Queue(#[from] ServiceError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub items: usize,
    pub links_found: usize,
    pub submitted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub scratch_dir: PathBuf,
    /// Link counts up to this are submitted all at once.
    pub batch_threshold: usize,
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("temp/torrent_files"),
            batch_threshold: 200,
            chunk_size: 50,
            chunk_pause: Duration::from_secs(1),
        }
    }
}

pub struct IngestionPipeline {
    client: reqwest::Client,
    scraper: LinkScraper,
    queue: Arc<dyn DownloadQueue>,
    reconciler: Arc<dyn Reconcile>,
    settings: IngestSettings,
}

impl IngestionPipeline {
    /// Create the pipeline, creating the scratch directory if needed.
    pub fn new(
        client: reqwest::Client,
        scraper: LinkScraper,
        queue: Arc<dyn DownloadQueue>,
        reconciler: Arc<dyn Reconcile>,
        settings: IngestSettings,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&settings.scratch_dir)?;
        Ok(Self {
            client,
            scraper,
            queue,
            reconciler,
            settings,
        })
    }

    async fn scrape_all(&self, items: &[FeedItem]) -> Vec<String> {
        let scrapes = items.iter().map(|item| self.scraper.scrape(&item.link));
        join_all(scrapes).await.into_iter().flatten().collect()
    }

    /// Submit every link; returns `(submitted, failed)`.
    async fn submit_all(&self, links: &[String]) -> (usize, usize) {
        let mut submitted = 0;
        let mut failed = 0;

        let chunk_size = if links.len() <= self.settings.batch_threshold {
            links.len().max(1)
        } else {
            self.settings.chunk_size.max(1)
        };
        let chunk_count = links.len().div_ceil(chunk_size);

        for (i, chunk) in links.chunks(chunk_size).enumerate() {
            let results = join_all(chunk.iter().map(|link| self.submit(link))).await;
            for (link, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => submitted += 1,
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(link = %link, error = %e, "Failed to submit attachment");
                    }
                }
            }

            if i + 1 < chunk_count {
                tracing::debug!(
                    chunk = i + 1,
                    chunks = chunk_count,
                    pause_ms = self.settings.chunk_pause.as_millis() as u64,
                    "Pausing between submission chunks"
                );
                tokio::time::sleep(self.settings.chunk_pause).await;
            }
        }

        (submitted, failed)
    }

    /// Download one attachment to a scratch file and hand it to the queue.
    ///
    /// The scratch file is removed on every path: explicitly after the
    /// hand-off, or by `NamedTempFile`'s drop on early return.
    async fn submit(&self, link: &str) -> Result<(), SubmitError> {
        let bytes = fetch_bytes(&self.client, link, ATTACHMENT_TIMEOUT, MAX_ATTACHMENT_SIZE).await?;

        let dir = self.settings.scratch_dir.clone();
        let scratch = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut scratch = tempfile::Builder::new()
                .prefix("attachment-")
                .suffix(".torrent")
                .tempfile_in(dir)?;
            scratch.write_all(&bytes)?;
            scratch.flush()?;
            Ok(scratch)
        })
        .await
        .map_err(std::io::Error::other)??;

        let handed_off = self.queue.add(scratch.path()).await;

        let path = scratch.path().to_path_buf();
        let removed = tokio::task::spawn_blocking(move || scratch.close())
            .await
            .map_err(std::io::Error::other)
            .and_then(|closed| closed);
        if let Err(e) = removed {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
        }

        handed_off?;
        tracing::debug!(link = %link, "Attachment queued");
        Ok(())
    }
}

#[async_trait]
impl ItemProcessor for IngestionPipeline {
    async fn process_new_items(&self, items: Vec<FeedItem>) -> IngestReport {
        let links = self.scrape_all(&items).await;
        tracing::info!(items = items.len(), links = links.len(), "Scraped new feed items");

        let (submitted, failed) = if links.is_empty() {
            (0, 0)
        } else {
            self.submit_all(&links).await
        };

        let report = IngestReport {
            items: items.len(),
            links_found: links.len(),
            submitted,
            failed,
        };
        tracing::info!(
            submitted = report.submitted,
            failed = report.failed,
            "Finished submitting attachments"
        );

        self.reconciler.reconcile().await;
        report
    }
}
