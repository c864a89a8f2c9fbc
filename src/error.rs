//! Error type shared by the store, the playlist file codecs and the CLI.

use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::StemsMixId;

#[derive(Debug, Error)]
pub enum StemsMixError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("StemsMix {0} is locked")]
    Locked(StemsMixId),

    #[error("StemsMix {0} does not exist")]
    NotFound(StemsMixId),

    #[error("Invalid StemsMix name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StemsMixError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StemsMixError>;
