//! Outbound notification seam shared by the scheduler and the mention relay.

use async_trait::async_trait;
use thiserror::Error;

/// Where a message goes: a channel, optionally inside an existing thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub channel_id: String,
    pub thread_ts: Option<String>,
}

impl Destination {
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: None,
        }
    }

    pub fn thread(channel_id: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: Some(thread_ts.into()),
        }
    }
}

/// Identifies a posted message so it can be edited later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: String,
    pub ts: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{method} rejected: {error}")]
    Rejected { method: String, error: String },
    #[error("{method} transport failure: {message}")]
    Transport { method: String, message: String },
}

impl NotificationError {
    pub fn method(&self) -> &str {
        match self {
            Self::Rejected { method, .. } | Self::Transport { method, .. } => method,
        }
    }
}

/// Chat platform operations the runtimes consume. Implementations deliver
/// once; retrying is left to the transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn post(
        &self,
        destination: &Destination,
        body: &str,
    ) -> Result<MessageRef, NotificationError>;

    async fn update(&self, message: &MessageRef, body: &str) -> Result<(), NotificationError>;
}
