mod assets;
mod health;
mod images;

pub use assets::serve_asset;
pub use health::health;
pub use images::{create_image, delete_image, get_image, list_images};
