use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flipside::{
    api,
    asset_host::{AssetHost, CloudinaryHost, LocalAssetHost},
    catalog::Catalog,
    config::{AssetBackend, Config},
    pipeline::ImagePipeline,
    removal::RemoveBgClient,
    transform::HorizontalFlip,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "flipside starting");

    // Load configuration
    let config = Config::load()?;

    // Load the catalog (self-heals a missing or corrupt snapshot)
    let catalog = Arc::new(Catalog::load(&config.catalog.path)?);
    info!(
        records = catalog.len()?,
        "Catalog loaded from: {}", config.catalog.path
    );

    // Shared HTTP client for upstream services
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout())
        .build()?;

    // Initialize asset host backend
    let mut local_assets = None;
    let assets: Arc<dyn AssetHost> = match &config.assets.backend {
        AssetBackend::Local => {
            let store = Arc::new(LocalAssetHost::new(
                &config.assets.local_path,
                &config.assets.public_base_url,
            )?);
            info!(
                "Using local asset backend at: {}",
                config.assets.local_path
            );
            local_assets = Some(Arc::clone(&store));
            store
        }
        AssetBackend::Cloudinary(cloudinary) => {
            info!(
                "Using Cloudinary asset backend, cloud: {}",
                cloudinary.cloud_name
            );
            Arc::new(CloudinaryHost::new(
                http.clone(),
                &cloudinary.cloud_name,
                &cloudinary.api_key,
                &cloudinary.api_secret,
            ))
        }
    };

    let remover = Arc::new(RemoveBgClient::new(
        http,
        &config.removal.api_key,
        &config.removal.endpoint,
    ));

    let pipeline = ImagePipeline::new(
        assets,
        remover,
        Arc::new(HorizontalFlip),
        Arc::clone(&catalog),
        &config.assets.folder,
        config.upstream_timeout(),
    );

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        catalog,
        pipeline,
        local_assets,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
