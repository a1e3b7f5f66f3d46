//! flipside - background removal and flip service with a durable asset catalog
//!
//! This crate provides image upload, transformation and cataloging with:
//! - Swappable asset hosts (Cloudinary, local filesystem)
//! - Background removal through the remove.bg API
//! - A single-file JSON catalog, rewritten atomically on every change
//! - Compensating cleanup so failed uploads never leave orphaned assets
//! - REST API with multipart upload support

pub mod api;
pub mod asset_host;
pub mod catalog;
pub mod config;
pub mod pipeline;
pub mod removal;
#[cfg(test)]
pub mod testutil;
pub mod transform;

use std::sync::Arc;

use asset_host::LocalAssetHost;
use catalog::Catalog;
use config::Config;
use pipeline::ImagePipeline;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub pipeline: ImagePipeline,
    /// Set when assets are stored locally and served under `/assets/`
    pub local_assets: Option<Arc<LocalAssetHost>>,
}
