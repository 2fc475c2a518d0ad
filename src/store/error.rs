//! Run store error types.

/// Errors produced by [`RunStore`](crate::store::RunStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Step summaries could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row holds a value this version cannot read.
    #[error("corrupt run row {run_id}: {reason}")]
    Corrupt { run_id: i64, reason: String },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("run store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used by the store modules.
pub type Result<T> = std::result::Result<T, StoreError>;
