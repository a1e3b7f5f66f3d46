use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{AssetHost, AssetHostError, StoredAsset};

/// Filesystem asset host for development and testing.
///
/// Assets live at `{base_path}/{namespace}/{key}` and are published through
/// this server's `/assets/` route.
pub struct LocalAssetHost {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalAssetHost {
    pub fn new<P: AsRef<Path>>(base_path: P, public_base_url: &str) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, asset_ref: &str) -> String {
        format!("{}/assets/{}", self.public_base_url, asset_ref)
    }

    pub async fn get(&self, asset_ref: &str) -> Result<Bytes, AssetHostError> {
        let path = self.asset_path(asset_ref)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetHostError::NotFound(asset_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a reference to a path below `base_path`, refusing anything
    /// that could step outside it.
    fn asset_path(&self, asset_ref: &str) -> Result<PathBuf, AssetHostError> {
        let valid = !asset_ref.is_empty()
            && asset_ref
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
            && !asset_ref.contains('\\');
        if !valid {
            return Err(AssetHostError::InvalidRef(asset_ref.to_string()));
        }
        Ok(self.base_path.join(asset_ref))
    }
}

#[async_trait]
impl AssetHost for LocalAssetHost {
    async fn store(
        &self,
        data: Bytes,
        namespace: &str,
        key: &str,
    ) -> Result<StoredAsset, AssetHostError> {
        let asset_ref = format!("{}/{}", namespace.trim_matches('/'), key);
        let path = self.asset_path(&asset_ref)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        Ok(StoredAsset {
            url: self.url_for(&asset_ref),
            asset_ref,
        })
    }

    async fn delete(&self, asset_ref: &str) -> Result<(), AssetHostError> {
        let path = self.asset_path(asset_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
