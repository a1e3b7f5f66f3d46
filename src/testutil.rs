//! Shared test helpers: in-memory collaborators and an HTTP harness.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::asset_host::{AssetHost, AssetHostError, StoredAsset};
use crate::catalog::Catalog;
use crate::config::{
    AssetConfig, CatalogConfig, Config, RemovalConfig, ServerConfig, DEFAULT_REMOVE_BG_ENDPOINT,
};
use crate::pipeline::ImagePipeline;
use crate::removal::{BackgroundRemover, RemovalError};
use crate::transform::{ImageTransform, TransformError};
use crate::AppState;

// ============================================================================
// Asset host
// ============================================================================

/// In-memory asset host with injectable failures.
#[derive(Default)]
pub struct MemoryAssetHost {
    assets: Mutex<HashMap<String, Bytes>>,
    failing_namespaces: Mutex<HashSet<String>>,
    failing_delete_prefixes: Mutex<Vec<String>>,
    hanging_namespaces: Mutex<HashSet<String>>,
    hanging_delete_prefixes: Mutex<Vec<String>>,
    delete_attempts: Mutex<Vec<String>>,
    store_attempts: AtomicUsize,
}

impl MemoryAssetHost {
    pub fn fail_stores_in(&self, namespace: &str) {
        self.failing_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    pub fn fail_deletes_under(&self, prefix: &str) {
        self.failing_delete_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// Stores into `namespace` never complete.
    pub fn hang_stores_in(&self, namespace: &str) {
        self.hanging_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    /// Deletes of refs starting with `prefix` never complete.
    pub fn hang_deletes_under(&self, prefix: &str) {
        self.hanging_delete_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        self.failing_namespaces.lock().unwrap().clear();
        self.failing_delete_prefixes.lock().unwrap().clear();
        self.hanging_namespaces.lock().unwrap().clear();
        self.hanging_delete_prefixes.lock().unwrap().clear();
    }

    pub fn contains(&self, asset_ref: &str) -> bool {
        self.assets.lock().unwrap().contains_key(asset_ref)
    }

    pub fn get(&self, asset_ref: &str) -> Option<Bytes> {
        self.assets.lock().unwrap().get(asset_ref).cloned()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    pub fn delete_attempts(&self) -> Vec<String> {
        self.delete_attempts.lock().unwrap().clone()
    }

    pub fn store_attempts(&self) -> usize {
        self.store_attempts.load(Ordering::SeqCst)
    }

    pub fn url_for(&self, asset_ref: &str) -> String {
        format!("https://assets.test/{asset_ref}")
    }
}

#[async_trait]
impl AssetHost for MemoryAssetHost {
    async fn store(
        &self,
        data: Bytes,
        namespace: &str,
        key: &str,
    ) -> Result<StoredAsset, AssetHostError> {
        self.store_attempts.fetch_add(1, Ordering::SeqCst);
        let hanging = self.hanging_namespaces.lock().unwrap().contains(namespace);
        if hanging {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing_namespaces.lock().unwrap().contains(namespace) {
            return Err(AssetHostError::Backend(format!(
                "injected store failure in {namespace}"
            )));
        }

        let asset_ref = format!("{namespace}/{key}");
        self.assets.lock().unwrap().insert(asset_ref.clone(), data);
        Ok(StoredAsset {
            url: self.url_for(&asset_ref),
            asset_ref,
        })
    }

    async fn delete(&self, asset_ref: &str) -> Result<(), AssetHostError> {
        self.delete_attempts
            .lock()
            .unwrap()
            .push(asset_ref.to_string());

        let hanging = self
            .hanging_delete_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| asset_ref.starts_with(prefix.as_str()));
        if hanging {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let failing = self
            .failing_delete_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| asset_ref.starts_with(prefix.as_str()));
        if failing {
            return Err(AssetHostError::Backend(format!(
                "injected delete failure for {asset_ref}"
            )));
        }

        self.assets.lock().unwrap().remove(asset_ref);
        Ok(())
    }
}

// ============================================================================
// Background remover
// ============================================================================

#[derive(Clone)]
enum RemoverBehavior {
    Passthrough,
    Replace(Bytes),
    Reject(Option<String>),
    Hang,
}

/// Background remover returning a scripted outcome.
pub struct ScriptedRemover {
    behavior: RemoverBehavior,
    calls: AtomicUsize,
    mime_types: Mutex<Vec<String>>,
}

impl ScriptedRemover {
    fn with(behavior: RemoverBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            mime_types: Mutex::default(),
        }
    }

    /// Returns the input unchanged.
    pub fn passthrough() -> Self {
        Self::with(RemoverBehavior::Passthrough)
    }

    pub fn replacing(output: Bytes) -> Self {
        Self::with(RemoverBehavior::Replace(output))
    }

    pub fn rejecting(detail: Option<&str>) -> Self {
        Self::with(RemoverBehavior::Reject(detail.map(str::to_string)))
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with(RemoverBehavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// MIME types received, in call order.
    pub fn mime_types(&self) -> Vec<String> {
        self.mime_types.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundRemover for ScriptedRemover {
    async fn remove(&self, data: Bytes, mime_type: &str) -> Result<Bytes, RemovalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mime_types.lock().unwrap().push(mime_type.to_string());
        match self.behavior.clone() {
            RemoverBehavior::Passthrough => Ok(data),
            RemoverBehavior::Replace(output) => Ok(output),
            RemoverBehavior::Reject(detail) => Err(RemovalError::Rejected {
                status: 402,
                detail,
            }),
            RemoverBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(data)
            }
        }
    }
}

/// Transform that leaves the bytes untouched.
pub struct IdentityTransform;

impl ImageTransform for IdentityTransform {
    fn apply(&self, data: &[u8]) -> Result<Bytes, TransformError> {
        Ok(Bytes::copy_from_slice(data))
    }
}

// ============================================================================
// Images
// ============================================================================

fn encode_png(image: image::RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    out.into_inner()
}

/// Fully opaque PNG.
pub fn opaque_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(image::RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([200, 40, 40, 255]),
    ))
}

/// PNG whose left half is transparent, as a background remover would return.
pub fn transparent_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(image::RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            image::Rgba([0, 0, 0, 0])
        } else {
            image::Rgba([200, 40, 40, 255])
        }
    }))
}

// ============================================================================
// Pipeline and app state
// ============================================================================

/// Handles to the collaborators behind a test pipeline.
pub struct Fixture {
    pub assets: Arc<MemoryAssetHost>,
    pub catalog: Arc<Catalog>,
    pub remover: Arc<ScriptedRemover>,
}

pub fn test_pipeline(
    temp_dir: &tempfile::TempDir,
    remover: ScriptedRemover,
) -> (ImagePipeline, Fixture) {
    test_pipeline_with(
        temp_dir,
        remover,
        Arc::new(IdentityTransform),
        Duration::from_secs(5),
    )
}

pub fn test_pipeline_with(
    temp_dir: &tempfile::TempDir,
    remover: ScriptedRemover,
    transform: Arc<dyn ImageTransform>,
    upstream_timeout: Duration,
) -> (ImagePipeline, Fixture) {
    let catalog = Arc::new(
        Catalog::load(temp_dir.path().join("data").join("catalog.json"))
            .expect("Failed to open test catalog"),
    );
    let assets = Arc::new(MemoryAssetHost::default());
    let remover = Arc::new(remover);

    let pipeline = ImagePipeline::new(
        assets.clone(),
        remover.clone(),
        transform,
        Arc::clone(&catalog),
        "test",
        upstream_timeout,
    );

    (
        pipeline,
        Fixture {
            assets,
            catalog,
            remover,
        },
    )
}

pub fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..Default::default()
        },
        catalog: CatalogConfig {
            path: temp_dir
                .path()
                .join("data")
                .join("catalog.json")
                .to_string_lossy()
                .to_string(),
        },
        assets: AssetConfig {
            folder: "test".to_string(),
            local_path: temp_dir.path().join("assets").to_string_lossy().to_string(),
            ..Default::default()
        },
        removal: RemovalConfig {
            api_key: "test-key".to_string(),
            endpoint: DEFAULT_REMOVE_BG_ENDPOINT.to_string(),
        },
        upstream_timeout_secs: 5,
    }
}

/// Create a test AppState backed by in-memory collaborators.
pub fn test_state(
    temp_dir: &tempfile::TempDir,
    config: Config,
    remover: ScriptedRemover,
) -> (Arc<AppState>, Fixture) {
    let (pipeline, fixture) = test_pipeline(temp_dir, remover);

    let state = Arc::new(AppState {
        config,
        catalog: Arc::clone(&fixture.catalog),
        pipeline,
        local_assets: None,
    });
    (state, fixture)
}

/// Serve the router on an ephemeral port and return its base URL.
pub async fn spawn_app(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");
    let app = crate::api::create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });

    format!("http://{addr}")
}
