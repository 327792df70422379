use crate::fetch::{fetch_bytes, FetchError};
use async_trait::async_trait;
use std::time::Duration;

const FEED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Where feed documents come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable location, for logs and notifications.
    fn location(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;
}

/// Feed served over HTTP(S).
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        fetch_bytes(&self.client, &self.url, FEED_TIMEOUT, MAX_FEED_SIZE).await
    }
}
