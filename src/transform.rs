//! Local, deterministic image transforms.

use std::io::Cursor;

use bytes::Bytes;
use image::ImageFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// A pure transform over encoded image bytes. CPU-bound; callers run it off
/// the async executor.
pub trait ImageTransform: Send + Sync {
    fn apply(&self, data: &[u8]) -> Result<Bytes, TransformError>;
}

/// Mirrors the image left-to-right and re-encodes it as PNG so transparency
/// from background removal survives.
#[derive(Debug, Default, Clone, Copy)]
pub struct HorizontalFlip;

impl ImageTransform for HorizontalFlip {
    fn apply(&self, data: &[u8]) -> Result<Bytes, TransformError> {
        let image = image::load_from_memory(data).map_err(TransformError::Decode)?;
        let flipped = image.fliph();

        let mut out = Cursor::new(Vec::new());
        flipped
            .write_to(&mut out, ImageFormat::Png)
            .map_err(TransformError::Encode)?;
        Ok(Bytes::from(out.into_inner()))
    }
}
