use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation requires no open transaction: {0}")]
    TransactionOpen(&'static str),

    #[error("snapshot not found: {}", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("{0}")]
    Other(String),
}
