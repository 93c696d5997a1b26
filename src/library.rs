//! Track model and the catalog seam.
//!
//! The engine only consumes `Track` values. Where they come from is behind
//! the `Catalog` trait; `LocalCatalog` serves a music folder on disk.

use std::path::PathBuf;

use thiserror::Error;

mod model;
mod scan;

pub use model::*;
pub use scan::LocalCatalog;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog item not found: {0}")]
    NotFound(PathBuf),
    #[error("catalog i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A source of track listings, e.g. a remote media server or a local folder.
pub trait Catalog {
    fn album_items(&self, album_id: &str) -> Result<Vec<Track>, CatalogError>;
    fn playlist_items(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError>;
}
