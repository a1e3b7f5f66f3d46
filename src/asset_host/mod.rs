mod cloudinary;
mod local;

pub use cloudinary::CloudinaryHost;
pub use local::LocalAssetHost;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetHostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Invalid asset reference: {0}")]
    InvalidRef(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A blob stored at the asset host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Host-assigned identifier, used for later deletion
    pub asset_ref: String,
    /// Publicly resolvable URL
    pub url: String,
}

/// Remote host for original and processed images.
///
/// Deleting an asset that no longer exists must succeed, so a retried
/// delete is harmless.
#[async_trait]
pub trait AssetHost: Send + Sync {
    async fn store(
        &self,
        data: Bytes,
        namespace: &str,
        key: &str,
    ) -> Result<StoredAsset, AssetHostError>;
    async fn delete(&self, asset_ref: &str) -> Result<(), AssetHostError>;
}
