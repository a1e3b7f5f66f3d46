use thiserror::Error;

use crate::catalog::CatalogError;
use crate::transform::TransformError;

/// Failure of a create or delete pipeline, tagged with a stable code.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("{}", removal_message(.detail))]
    UpstreamRemoval { detail: Option<String> },
    #[error("Image upload failed: {0}")]
    UpstreamStorage(String),
    #[error("Failed to delete image from storage")]
    UpstreamDelete,
    #[error("Image not found")]
    NotFound,
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Machine-readable cause, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::UpstreamRemoval { .. } => "upstream_removal_failure",
            PipelineError::UpstreamStorage(_) => "upstream_storage_failure",
            PipelineError::UpstreamDelete => "upstream_delete_failure",
            PipelineError::NotFound => "not_found",
            PipelineError::Unexpected(_) => "unexpected",
        }
    }
}

fn removal_message(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!("Background removal failed: {detail}"),
        None => "Background removal failed.".to_string(),
    }
}

impl From<CatalogError> for PipelineError {
    fn from(e: CatalogError) -> Self {
        PipelineError::Unexpected(format!("catalog: {e}"))
    }
}

impl From<TransformError> for PipelineError {
    fn from(e: TransformError) -> Self {
        PipelineError::Unexpected(e.to_string())
    }
}
