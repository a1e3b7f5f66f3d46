pub mod models;
mod store;

pub use models::{AssetRecord, CatalogSnapshot};
pub use store::{Catalog, CatalogError};
