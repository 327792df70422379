use super::Notifier;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct Message<'a> {
    topic: &'a str,
    title: &'a str,
    message: &'a str,
    tags: &'a [&'a str],
}

/// Publishes JSON messages to an ntfy server.
pub struct NtfyNotifier {
    client: reqwest::Client,
    server: String,
    topic: String,
}

impl NtfyNotifier {
    pub fn new(client: reqwest::Client, server: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            client,
            server: server.into(),
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn send(&self, title: &str, message: &str, tags: &[&str]) {
        let body = Message {
            topic: &self.topic,
            title,
            message,
            tags,
        };
        let request = self.client.post(&self.server).json(&body).send();

        match tokio::time::timeout(REQUEST_TIMEOUT, request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::info!(title = %title, "Notification sent");
            }
            Ok(Ok(response)) => {
                tracing::warn!(status = %response.status(), title = %title, "Notification rejected");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, title = %title, "Failed to send notification");
            }
            Err(_) => {
                tracing::warn!(title = %title, "Notification timed out");
            }
        }
    }
}

/// Notifier used when notifications are turned off.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, title: &str, _message: &str, _tags: &[&str]) {
        tracing::debug!(title = %title, "Notifications disabled, dropping message");
    }
}
