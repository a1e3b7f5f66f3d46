//! Create and delete pipelines over the asset host, the background remover,
//! the transform step and the catalog.
//!
//! A create either ends with a committed catalog record or with every asset
//! it uploaded deleted again (best-effort). A delete only touches the catalog
//! once both remote copies are gone.

mod error;

pub use error::PipelineError;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::asset_host::{AssetHost, AssetHostError, StoredAsset};
use crate::catalog::{AssetRecord, Catalog};
use crate::removal::BackgroundRemover;
use crate::transform::ImageTransform;

const ORIGINALS: &str = "originals";
const PROCESSED: &str = "processed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedImage {
    pub id: String,
    pub processed_url: String,
}

pub struct ImagePipeline {
    assets: Arc<dyn AssetHost>,
    catalog: Arc<Catalog>,
    folder: String,
    remover: Arc<dyn BackgroundRemover>,
    transform: Arc<dyn ImageTransform>,
    upstream_timeout: Duration,
}

impl ImagePipeline {
    pub fn new(
        assets: Arc<dyn AssetHost>,
        remover: Arc<dyn BackgroundRemover>,
        transform: Arc<dyn ImageTransform>,
        catalog: Arc<Catalog>,
        folder: &str,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            assets,
            catalog,
            folder: folder.trim_matches('/').to_string(),
            remover,
            transform,
            upstream_timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Upload, strip the background, flip, upload the result and record it.
    pub async fn create(
        &self,
        data: Bytes,
        mime_type: &str,
    ) -> Result<CreatedImage, PipelineError> {
        let mime_type = mime_type.trim();
        validate_upload(&data, mime_type)?;

        let id = uuid::Uuid::new_v4().to_string();
        let mut created: Vec<String> = Vec::with_capacity(2);

        match self.run_create(&id, data, mime_type, &mut created).await {
            Ok(image) => {
                info!(image_id = %id, "Created image");
                Ok(image)
            }
            Err(e) => {
                warn!(
                    image_id = %id,
                    cause = e.code(),
                    error = %e,
                    assets = created.len(),
                    "Create failed, rolling back uploaded assets"
                );
                self.compensate(&id, &created).await;
                Err(e)
            }
        }
    }

    async fn run_create(
        &self,
        id: &str,
        data: Bytes,
        mime_type: &str,
        created: &mut Vec<String>,
    ) -> Result<CreatedImage, PipelineError> {
        let original = self
            .store(data.clone(), &self.namespace(ORIGINALS), &format!("orig_{id}"))
            .await?;
        created.push(original.asset_ref.clone());

        let cutout = self.remove_background(data, mime_type).await?;
        let flipped = self.flip(cutout).await?;

        let processed = self
            .store(flipped, &self.namespace(PROCESSED), &format!("proc_{id}"))
            .await?;
        created.push(processed.asset_ref.clone());

        let record = AssetRecord {
            id: id.to_string(),
            original_asset_ref: original.asset_ref,
            processed_asset_ref: processed.asset_ref,
            processed_url: processed.url.clone(),
            created_at: Utc::now(),
        };
        self.commit(record).await?;

        Ok(CreatedImage {
            id: id.to_string(),
            processed_url: processed.url,
        })
    }

    /// Best-effort undo of uploads from a failed create. Failures are logged
    /// and never replace the error that triggered the rollback.
    async fn compensate(&self, id: &str, asset_refs: &[String]) {
        for asset_ref in asset_refs {
            match self.delete_asset(asset_ref).await {
                Ok(()) => debug!(image_id = %id, asset_ref = %asset_ref, "Rolled back asset"),
                Err(e) => warn!(
                    image_id = %id,
                    asset_ref = %asset_ref,
                    error = %e,
                    "Failed to roll back asset"
                ),
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<AssetRecord, PipelineError> {
        self.catalog.get(id)?.ok_or(PipelineError::NotFound)
    }

    /// Delete both remote copies, then the catalog record. If either remote
    /// delete fails the record stays so the whole delete can be retried.
    pub async fn delete(&self, id: &str) -> Result<(), PipelineError> {
        let record = self.get(id)?;

        let (original, processed) = tokio::join!(
            self.delete_asset(&record.original_asset_ref),
            self.delete_asset(&record.processed_asset_ref),
        );

        let mut failed = false;
        for (asset_ref, result) in [
            (&record.original_asset_ref, original),
            (&record.processed_asset_ref, processed),
        ] {
            if let Err(e) = result {
                warn!(image_id = %id, asset_ref = %asset_ref, error = %e, "Failed to delete asset");
                failed = true;
            }
        }
        if failed {
            return Err(PipelineError::UpstreamDelete);
        }

        self.forget(id).await?;
        info!(image_id = %id, "Deleted image");
        Ok(())
    }

    async fn store(
        &self,
        data: Bytes,
        namespace: &str,
        key: &str,
    ) -> Result<StoredAsset, PipelineError> {
        match timeout(self.upstream_timeout, self.assets.store(data, namespace, key)).await {
            Ok(Ok(asset)) => {
                debug!(asset_ref = %asset.asset_ref, "Stored asset");
                Ok(asset)
            }
            Ok(Err(e)) => Err(PipelineError::UpstreamStorage(e.to_string())),
            Err(_) => Err(PipelineError::UpstreamStorage(format!(
                "upload of {namespace}/{key} timed out after {:?}",
                self.upstream_timeout
            ))),
        }
    }

    async fn remove_background(&self, data: Bytes, mime_type: &str) -> Result<Bytes, PipelineError> {
        match timeout(self.upstream_timeout, self.remover.remove(data, mime_type)).await {
            Ok(Ok(cutout)) => Ok(cutout),
            Ok(Err(e)) => {
                warn!(error = %e, detail = ?e.detail(), "Background removal failed");
                Err(PipelineError::UpstreamRemoval {
                    detail: e.detail().map(str::to_string),
                })
            }
            Err(_) => {
                warn!(timeout = ?self.upstream_timeout, "Background removal timed out");
                Err(PipelineError::UpstreamRemoval { detail: None })
            }
        }
    }

    async fn flip(&self, data: Bytes) -> Result<Bytes, PipelineError> {
        let transform = Arc::clone(&self.transform);
        let flipped = tokio::task::spawn_blocking(move || transform.apply(&data))
            .await
            .map_err(|e| PipelineError::Unexpected(format!("transform task failed: {e}")))??;
        Ok(flipped)
    }

    // Catalog writes fsync under the index lock, so keep them off the executor.
    async fn commit(&self, record: AssetRecord) -> Result<(), PipelineError> {
        let catalog = Arc::clone(&self.catalog);
        tokio::task::spawn_blocking(move || catalog.insert(record))
            .await
            .map_err(|e| PipelineError::Unexpected(format!("catalog task failed: {e}")))??;
        Ok(())
    }

    async fn forget(&self, id: &str) -> Result<(), PipelineError> {
        let catalog = Arc::clone(&self.catalog);
        let id = id.to_string();
        tokio::task::spawn_blocking(move || catalog.delete(&id))
            .await
            .map_err(|e| PipelineError::Unexpected(format!("catalog task failed: {e}")))??;
        Ok(())
    }

    async fn delete_asset(&self, asset_ref: &str) -> Result<(), AssetHostError> {
        match timeout(self.upstream_timeout, self.assets.delete(asset_ref)).await {
            Ok(result) => result,
            Err(_) => Err(AssetHostError::Backend(format!(
                "delete of {asset_ref} timed out after {:?}",
                self.upstream_timeout
            ))),
        }
    }

    fn namespace(&self, kind: &str) -> String {
        format!("{}/{}", self.folder, kind)
    }
}

/// Reject input before any remote call is made.
pub fn validate_upload(data: &[u8], mime_type: &str) -> Result<(), PipelineError> {
    if data.is_empty() {
        return Err(PipelineError::Validation(
            "Uploaded image is empty.".to_string(),
        ));
    }
    if !mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(PipelineError::Validation(
            "Only image uploads are supported.".to_string(),
        ));
    }
    Ok(())
}
