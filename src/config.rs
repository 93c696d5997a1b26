//! Configuration schema, persistence and the staged settings draft.
//!
//! This module exposes the settings schema used to seed the engine, a
//! file-backed store to load and save it, and `SettingsSync` which lets a
//! settings screen stage edits without touching live playback.

use std::path::PathBuf;

use thiserror::Error;

mod load;
mod schema;
mod sync;

pub use load::*;
pub use schema::*;
pub use sync::*;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no settings path could be resolved")]
    NoPath,
    #[error("invalid settings: {0}")]
    Invalid(String),
}
