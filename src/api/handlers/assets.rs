use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::asset_host::AssetHostError;
use crate::pipeline::PipelineError;
use crate::AppState;

/// Serve a locally hosted asset.
/// Route: GET /assets/*asset_ref
pub async fn serve_asset(
    State(state): State<Arc<AppState>>,
    Path(asset_ref): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::new(StatusCode::NOT_FOUND, "not_found", "Asset not found.");

    let store = state.local_assets.as_ref().ok_or_else(not_found)?;
    let data = store.get(&asset_ref).await.map_err(|e| match e {
        AssetHostError::NotFound(_) | AssetHostError::InvalidRef(_) => not_found(),
        _ => ApiError::from(PipelineError::Unexpected(format!(
            "Failed to read asset {asset_ref}: {e}"
        ))),
    })?;

    let content_type = image::guess_format(&data)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type),
    );

    // Keys embed a fresh id per upload, so content never changes
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=3600"),
    );

    Ok(response)
}
