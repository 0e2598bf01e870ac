//! Error type for the sync pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a run. Data-shape problems never surface here; they
/// are filtered and reported as dropped rows instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("API error: {0}")]
    Api(#[from] athlete_sync_client::SyncClientError),

    #[error("staging file error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("staging file {} is missing after the fetch phase", .0.display())]
    StagingMissing(PathBuf),

    #[error("another run holds the lock at {}", .0.display())]
    Locked(PathBuf),

    #[error("{failed} of {attempted} uploads were rejected")]
    PartialUpload { failed: usize, attempted: usize },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::StagingMissing(_) => 2,
            SyncError::Locked(_) => 3,
            _ => 1,
        }
    }
}

/// Result type alias for pipeline operations.
pub type SyncResult<T> = Result<T, SyncError>;
