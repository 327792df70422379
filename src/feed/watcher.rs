use super::parser::{parse_feed, ParseResult};
use super::snapshot::{seed_last_seen, write_atomic};
use super::source::FeedSource;
use crate::ingest::ItemProcessor;
use crate::model::FeedItem;
use crate::services::Notifier;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What one poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The feed could not be fetched or parsed; state is unchanged.
    Failed,
    NoNewItems,
    Dispatched {
        items: usize,
        last_seen: DateTime<Utc>,
    },
}

/// Polls a feed and forwards items published after `last_seen`.
pub struct FeedWatcher {
    source: Arc<dyn FeedSource>,
    processor: Arc<dyn ItemProcessor>,
    notifier: Arc<dyn Notifier>,
    snapshot_path: Option<PathBuf>,
    last_seen: Mutex<DateTime<Utc>>,
}

impl FeedWatcher {
    /// Create a watcher whose `last_seen` is seeded from `snapshot_path`.
    pub fn new(
        source: Arc<dyn FeedSource>,
        processor: Arc<dyn ItemProcessor>,
        notifier: Arc<dyn Notifier>,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        let seed = seed_last_seen(snapshot_path.as_deref(), Utc::now());
        Self::with_last_seen(source, processor, notifier, snapshot_path, seed)
    }

    pub fn with_last_seen(
        source: Arc<dyn FeedSource>,
        processor: Arc<dyn ItemProcessor>,
        notifier: Arc<dyn Notifier>,
        snapshot_path: Option<PathBuf>,
        last_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            processor,
            notifier,
            snapshot_path,
            last_seen: Mutex::new(last_seen),
        }
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `last_seen` forward to `candidate`; never backward.
    fn advance(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let mut guard = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        if candidate > *guard {
            *guard = candidate;
        }
        *guard
    }

    fn write_snapshot(&self, bytes: &[u8]) {
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = write_atomic(path, bytes) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write feed snapshot");
            }
        }
    }

    /// Fetch the feed once and dispatch anything new.
    pub async fn poll(&self) -> PollOutcome {
        let location = self.source.location().to_string();
        tracing::info!(url = %location, "Checking feed");

        let bytes = match self.source.fetch().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(url = %location, error = %e, "Error fetching feed");
                self.notifier
                    .notify_error("RSS Feed", &format!("Cannot access {} - {}", location, e))
                    .await;
                return PollOutcome::Failed;
            }
        };

        let ParseResult { items, skipped } = match parse_feed(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(url = %location, error = %e, "Error parsing feed");
                self.notifier
                    .notify_error("RSS Feed", &format!("Cannot parse {} - {}", location, e))
                    .await;
                return PollOutcome::Failed;
            }
        };
        if skipped > 0 {
            tracing::warn!(url = %location, skipped, "Feed items without link or date skipped");
        }

        let fresh = newer_than(items, self.last_seen());
        let Some(newest) = fresh.iter().map(|item| item.published).max() else {
            tracing::info!("No new items found");
            self.write_snapshot(&bytes);
            return PollOutcome::NoNewItems;
        };

        let count = fresh.len();
        tracing::info!(items = count, "Found new feed items");
        self.processor.process_new_items(fresh).await;

        let last_seen = self.advance(newest);
        tracing::info!(last_seen = %last_seen, "Updated last_seen");
        // The snapshot seeds last_seen on restart, so it may only cover dispatched items
        self.write_snapshot(&bytes);
        PollOutcome::Dispatched {
            items: count,
            last_seen,
        }
    }

    /// Poll now, then every `interval`, forever.
    ///
    /// Each tick starts its own poll task, so a slow poll can overlap the next.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let watcher = Arc::clone(&self);
            tokio::spawn(async move {
                watcher.poll().await;
            });
        }
    }
}

/// Leading items published strictly after `last_seen`, in feed order.
///
/// The feed is newest-first, so scanning stops at the first stale item.
pub fn newer_than(items: Vec<FeedItem>, last_seen: DateTime<Utc>) -> Vec<FeedItem> {
    items
        .into_iter()
        .take_while(|item| item.published > last_seen)
        .collect()
}
