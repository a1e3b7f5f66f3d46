use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A transformed image as recorded in the catalog.
///
/// Only ever persisted once both the original and the processed upload have
/// succeeded, so every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: String,
    #[serde(alias = "originalPublicId")]
    pub original_asset_ref: String,
    #[serde(alias = "processedPublicId")]
    pub processed_asset_ref: String,
    pub processed_url: String,
    pub created_at: DateTime<Utc>,
}

/// On-disk layout of the catalog, rewritten as a whole on every mutation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub images: Vec<AssetRecord>,
}
