//! Outbound user notifications.
//!
//! The engine publishes through [`NotificationSink`] and never waits on a
//! delivery outcome to decide a record's state.

pub mod sinks;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{NotificationConfig, SinkKind};
use crate::store::unix_now;

pub use sinks::{ChannelSink, LogSink, WebhookSink};

/// Notification type emitted when a Safe creation settles.
pub const SAFE_CREATION_UPDATE: &str = "safe_creation_update";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    pub timestamp: u64,
}

impl Notification {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: unix_now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("no subscribers")]
    NoSubscribers,

    #[error("notification sink misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish_to_user(&self, user_id: &str, notification: Notification) -> Result<(), NotificationError>;
}

/// Build the sink selected in configuration.
///
/// [`ChannelSink`] is not selectable here; embedders construct it directly
/// and hand it to the engine alongside their own receivers.
pub fn build_sink(config: &NotificationConfig) -> Result<Arc<dyn NotificationSink>, NotificationError> {
    Ok(match config.sink {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Webhook => Arc::new(WebhookSink::new(
            &config.webhook_url,
            Duration::from_secs(config.timeout_secs),
        )?),
    })
}
