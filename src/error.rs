use std::path::PathBuf;
use thiserror::Error;

/// Flight sync error types
///
/// Only construction-time failures live here. An empty index, an
/// out-of-range row or a missing correspondence map are ordinary `None`
/// results on the query side.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Source unreadable: {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input: {0}")]
    DecodeMalformed(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::SourceUnreadable {
            path: path.into(),
            source,
        }
    }

    /// True for failures that abort construction of an index or mapper.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnreadable { .. } | SyncError::DecodeMalformed(_)
        )
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::DecodeMalformed(err.to_string())
    }
}

/// Result type for flight sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
