mod remove_bg;

pub use remove_bg::RemoveBgClient;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("Background removal request failed: {0}")]
    Transport(String),
    #[error("Background removal rejected with status {status}")]
    Rejected { status: u16, detail: Option<String> },
}

impl RemovalError {
    /// Human-readable reason reported by the upstream service, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RemovalError::Rejected { detail, .. } => detail.as_deref(),
            RemovalError::Transport(_) => None,
        }
    }
}

/// Remote service that strips the background from an image.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove(&self, data: Bytes, mime_type: &str) -> Result<Bytes, RemovalError>;
}
