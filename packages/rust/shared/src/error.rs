//! The error type shared by every notemerge library crate.
//!
//! `notemerge-cli` converts these into `color_eyre::Report` at the edge.

use std::path::PathBuf;

/// Everything that can go wrong while loading, merging or storing notes.
#[derive(Debug, thiserror::Error)]
pub enum NoteMergeError {
    /// Bad or unreadable `notemerge.toml`.
    #[error("config error: {message}")]
    Config { message: String },

    /// libSQL failure, already rendered to text.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed import file or stored JSON column.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The request itself is unusable, e.g. a single card selected for a merge.
    #[error("validation error: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, NoteMergeError>;

impl NoteMergeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Usable directly in `map_err` on any libSQL result.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
