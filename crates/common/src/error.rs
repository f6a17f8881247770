use thiserror::Error;

/// Error taxonomy shared across every crate in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("volume {0} missing on disk")]
    VolumeMissing(u32),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("compaction of volume {0} left the catalog inconsistent with disk; run rebuild")]
    CompactionInconsistent(u32),

    #[error("catalog error: {0}")]
    CatalogError(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
