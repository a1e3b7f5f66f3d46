use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::BytesMut;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, Paginated, Pagination};
use crate::catalog::AssetRecord;
use crate::pipeline::{CreatedImage, PipelineError};
use crate::AppState;

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

const MISSING_FILE: &str = "Please upload a single image file.";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListImagesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

struct Upload {
    content_type: Option<String>,
    data: BytesMut,
    file_name: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<CreatedImage>), ApiError> {
    let mut multipart =
        multipart.map_err(|_| PipelineError::Validation(MISSING_FILE.to_string()))?;
    let max_size = state.config.server.max_upload_size;
    let mut upload: Option<Upload> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            // Ignore unknown fields
            continue;
        }
        if upload.is_some() {
            return Err(PipelineError::Validation(MISSING_FILE.to_string()).into());
        }

        let file_name = field.file_name().map(|s| s.to_string());
        let content_type = field.content_type().map(|s| s.to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if (data.len() + chunk.len()) as u64 > max_size {
                return Err(ApiError::payload_too_large(format!(
                    "File is too large. Max size is {max_size} bytes."
                )));
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(Upload {
            content_type,
            data,
            file_name,
        });
    }

    let upload = upload.ok_or_else(|| PipelineError::Validation(MISSING_FILE.to_string()))?;
    let mime_type = resolve_mime_type(upload.content_type, upload.file_name.as_deref());

    // Detached so a dropped connection cannot cancel a create halfway,
    // before it either commits or rolls back its uploads.
    let task_state = Arc::clone(&state);
    let task_mime = mime_type.clone();
    let data = upload.data.freeze();
    let created = tokio::spawn(async move { task_state.pipeline.create(data, &task_mime).await })
        .await
        .map_err(|e| PipelineError::Unexpected(format!("create task failed: {e}")))??;

    tracing::debug!(image_id = %created.id, mime_type = %mime_type, "Upload processed");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AssetRecord>, ApiError> {
    Ok(Json(state.pipeline.get(&id)?))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_images(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListImagesParams>,
) -> Result<Json<Paginated<AssetRecord>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::invalid_request("limit must be greater than 0"));
    }

    let records = state.catalog.list().map_err(PipelineError::from)?;
    let total = records.len() as u64;
    let items = records
        .into_iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .collect();

    Ok(Json(Paginated {
        items,
        pagination: Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("File is too large.")
    } else {
        ApiError::invalid_request(format!("Invalid multipart data: {}", e.body_text()))
    }
}

/// MIME type from the part's Content-Type, or guessed from the filename when
/// the client sent none or a generic one.
fn resolve_mime_type(content_type: Option<String>, file_name: Option<&str>) -> String {
    content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .and_then(|n| mime_guess::from_path(n).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
