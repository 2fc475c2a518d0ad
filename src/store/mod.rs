//! Run metadata persistence.
//!
//! [`RunStore`] is the contract the launcher uses to guarantee unique run
//! ids and to keep run history. Two backends ship with the crate:
//! [`InMemoryRunStore`] and the `SQLite`-backed [`SqliteRunStore`].

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::StoreError;
pub use memory::InMemoryRunStore;
pub use sqlite::SqliteRunStore;

use crate::result::RunRecord;
use crate::state_machine::RunId;

/// Storage contract for run history.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn RunStore>`.
pub trait RunStore: Send + Sync {
    /// Whether any run, of any job, already carries `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    fn is_run_id_used(&self, run_id: RunId) -> error::Result<bool>;

    /// Claim `record.run_id` for a new run.
    ///
    /// Insert-if-absent: returns `false`, and stores nothing, when the id is
    /// already taken.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    fn reserve_run(&self, record: &RunRecord) -> error::Result<bool>;

    /// Upsert the record of a run, typically once it reached a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    fn record_run(&self, record: &RunRecord) -> error::Result<()>;

    /// Highest run id stored so far.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    fn last_run_id(&self) -> error::Result<Option<RunId>>;

    /// Most recent runs first, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn RunStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn RunStore) {}
    }
}
