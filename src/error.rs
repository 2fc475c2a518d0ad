use std::fmt;

use thiserror::Error;

use crate::store::StoreError;
use crate::RunId;

/// Which collaborator call exceeded its time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Read of item #{position} failed in step `{step}`: {source}")]
    SourceRead {
        step: String,
        position: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Transform of item {item} failed in step `{step}`: {source}")]
    Transform {
        step: String,
        item: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Write of {items} items failed in step `{step}`: {source}")]
    SinkWrite {
        step: String,
        items: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Item {operation} timed out after {timeout_ms}ms in step `{step}`")]
    Timeout {
        step: String,
        operation: Operation,
        timeout_ms: u128,
    },

    #[error("Run id {0} has already been used")]
    DuplicateRun(RunId),

    #[error("Invalid job `{job}`: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("Run cancelled before step `{step}` could continue")]
    Cancelled { step: String },

    #[error("Run store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

impl BatchError {
    /// Whether the chunk layer may retry after this error.
    pub fn is_chunk_level(&self) -> bool {
        matches!(
            self,
            BatchError::SourceRead { .. }
                | BatchError::Transform { .. }
                | BatchError::SinkWrite { .. }
                | BatchError::Timeout { .. }
        )
    }

    /// Failure while pulling from the source, including a read timeout.
    pub fn is_read_failure(&self) -> bool {
        matches!(
            self,
            BatchError::SourceRead { .. }
                | BatchError::Timeout {
                    operation: Operation::Read,
                    ..
                }
        )
    }
}
