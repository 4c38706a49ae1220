//! Notification sink implementations.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::notifications::{Notification, NotificationError, NotificationSink};

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish_to_user(&self, user_id: &str, notification: Notification) -> Result<(), NotificationError> {
        tracing::info!(
            user_id,
            kind = %notification.kind,
            data = %notification.data,
            "Notification"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// POSTs each notification as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| NotificationError::Config(format!("invalid webhook URL '{}': {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Config(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn publish_to_user(&self, user_id: &str, notification: Notification) -> Result<(), NotificationError> {
        let res = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload {
                user_id,
                notification: &notification,
            })
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(NotificationError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Fans notifications out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<(String, Notification)>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(String, Notification)> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn publish_to_user(&self, user_id: &str, notification: Notification) -> Result<(), NotificationError> {
        self.tx
            .send((user_id.to_string(), notification))
            .map(|_| ())
            .map_err(|_| NotificationError::NoSubscribers)
    }
}
