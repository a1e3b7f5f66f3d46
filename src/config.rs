use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub assets: AssetConfig,
    pub removal: RemovalConfig,
    /// Upper bound for every remote call (upload, removal, delete), in seconds
    pub upstream_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Browser origin allowed by CORS. No CORS layer when unset.
    pub cors_origin: Option<String>,
    /// Maximum image size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Path of the JSON snapshot file
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub enum AssetBackend {
    Cloudinary(CloudinaryConfig),
    Local,
}

#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub backend: AssetBackend,
    /// Prefix for the `originals` and `processed` namespaces
    pub folder: String,
    /// Directory for local asset backend
    pub local_path: String,
    /// URL prefix under which this server is reachable (local backend)
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct RemovalConfig {
    pub api_key: String,
    pub endpoint: String,
}

pub const DEFAULT_REMOVE_BG_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            cors_origin: None,
            max_upload_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "./data/catalog.json".to_string(),
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            backend: AssetBackend::Local,
            folder: "flipside".to_string(),
            local_path: "./assets".to_string(),
            public_base_url: "http://localhost:4000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:4000".to_string());

        let cors_origin = std::env::var("CORS_ORIGIN")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024); // 10MB

        let upstream_timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let catalog_path =
            std::env::var("CATALOG_PATH").unwrap_or_else(|_| "./data/catalog.json".to_string());

        let backend = match std::env::var("ASSET_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "cloudinary" => AssetBackend::Cloudinary(CloudinaryConfig {
                cloud_name: require_env("CLOUDINARY_CLOUD_NAME")?,
                api_key: require_env("CLOUDINARY_API_KEY")?,
                api_secret: require_env("CLOUDINARY_API_SECRET")?,
            }),
            _ => AssetBackend::Local,
        };

        let folder = std::env::var("ASSET_FOLDER").unwrap_or_else(|_| "flipside".to_string());
        let local_path =
            std::env::var("LOCAL_ASSET_PATH").unwrap_or_else(|_| "./assets".to_string());
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:4000".to_string());

        let removal = RemovalConfig {
            api_key: require_env("REMOVE_BG_API_KEY")?,
            endpoint: std::env::var("REMOVE_BG_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_REMOVE_BG_ENDPOINT.to_string()),
        };

        let config = Config {
            server: ServerConfig {
                bind_address,
                cors_origin,
                max_upload_size,
            },
            catalog: CatalogConfig { path: catalog_path },
            assets: AssetConfig {
                backend,
                folder,
                local_path,
                public_base_url,
            },
            removal,
            upstream_timeout_secs,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.server.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        let folder = self.assets.folder.trim_matches('/');
        if folder.is_empty() || folder.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(ConfigError::ValidationError(format!(
                "ASSET_FOLDER '{}' is not a valid folder name",
                self.assets.folder
            )));
        }

        if self.catalog.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "CATALOG_PATH cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ConfigError::ValidationError(format!("Missing required environment variable: {key}"))
        })
}
