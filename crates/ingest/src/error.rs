use std::path::PathBuf;

use thiserror::Error;

use bgpstage_core::CoreError;
use bgpstage_queue::QueueError;
use bgpstage_store::StoreError;

/// Failure reading from a record source.
///
/// Errors tied to a single record are counted by the worker and skipped;
/// only a failure to open the source ends the assignment.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable record at line {line}: {message}")]
    Decode { line: u64, message: String },

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("fact queue closed")]
    QueueClosed,

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("worker task failed: {0}")]
    Join(String),

    #[error("config error: {0}")]
    Config(#[from] CoreError),
}

impl From<QueueError> for IngestError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Closed => IngestError::QueueClosed,
        }
    }
}
