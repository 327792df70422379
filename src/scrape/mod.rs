//! Attachment-link scraping with bounded, fixed-delay retries.

mod links;

pub use links::extract_attachment_links;

use crate::fetch::{fetch_bytes, FetchError};
use std::time::Duration;
use url::Url;

const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Link pattern used by IPS-based forums for file attachments.
pub const DEFAULT_ATTACHMENT_PATTERN: &str = "applications/core/interface/file/attachment.php";

/// How many times to try a page and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

pub struct LinkScraper {
    client: reqwest::Client,
    pattern: String,
    policy: RetryPolicy,
}

impl LinkScraper {
    pub fn new(client: reqwest::Client, pattern: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            pattern: pattern.into(),
            policy,
        }
    }

    /// Scrape `url` with the configured retry policy.
    pub async fn scrape(&self, url: &str) -> Vec<String> {
        self.scrape_with_retries(url, self.policy.max_attempts, self.policy.delay)
            .await
    }

    /// Try `url` up to `max_retries` times, stopping at the first attempt that
    /// yields a link.
    ///
    /// Failed fetches count as empty attempts. Between attempts the scraper
    /// sleeps a fixed `delay`; there is no sleep after the last one. Finding
    /// nothing is not an error: the result is empty and a single warning is
    /// logged.
    pub async fn scrape_with_retries(
        &self,
        url: &str,
        max_retries: u32,
        delay: Duration,
    ) -> Vec<String> {
        for attempt in 1..=max_retries {
            match self.scrape_once(url).await {
                Ok(links) if !links.is_empty() => {
                    tracing::debug!(url = %url, attempt, links = links.len(), "Scraped attachment links");
                    return links;
                }
                Ok(_) => {
                    tracing::debug!(url = %url, attempt, "No attachment links on page");
                }
                Err(e) => {
                    tracing::debug!(url = %url, attempt, error = %e, "Page fetch failed");
                }
            }

            if attempt < max_retries {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(
            url = %url,
            attempts = max_retries,
            "Failed to scrape any links"
        );
        Vec::new()
    }

    async fn scrape_once(&self, url: &str) -> Result<Vec<String>, FetchError> {
        let base = Url::parse(url).map_err(|e| FetchError::Parse(e.to_string()))?;
        let bytes = fetch_bytes(&self.client, url, PAGE_TIMEOUT, MAX_PAGE_SIZE).await?;
        let html = String::from_utf8_lossy(&bytes);
        Ok(extract_attachment_links(&html, &base, &self.pattern))
    }
}
