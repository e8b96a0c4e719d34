//! Error type shared by the storage, settings and surface layers.
use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bookmark host error: {0}")]
    Host(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Settings are not hydrated yet")]
    NotHydrated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
