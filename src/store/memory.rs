//! In-process [`RunStore`] for tests and one-shot runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::RunStore;
use super::error::{self, StoreError};
use crate::result::RunRecord;
use crate::state_machine::RunId;

/// Run history kept in a map; lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: Mutex<BTreeMap<RunId, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_runs(&self) -> error::Result<MutexGuard<'_, BTreeMap<RunId, RunRecord>>> {
        self.runs.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Stored record for `run_id`, if any.
    pub fn get(&self, run_id: RunId) -> error::Result<Option<RunRecord>> {
        Ok(self.lock_runs()?.get(&run_id).cloned())
    }
}

impl RunStore for InMemoryRunStore {
    fn is_run_id_used(&self, run_id: RunId) -> error::Result<bool> {
        Ok(self.lock_runs()?.contains_key(&run_id))
    }

    fn reserve_run(&self, record: &RunRecord) -> error::Result<bool> {
        let mut runs = self.lock_runs()?;
        if runs.contains_key(&record.run_id) {
            return Ok(false);
        }
        runs.insert(record.run_id, record.clone());
        Ok(true)
    }

    fn record_run(&self, record: &RunRecord) -> error::Result<()> {
        self.lock_runs()?.insert(record.run_id, record.clone());
        Ok(())
    }

    fn last_run_id(&self) -> error::Result<Option<RunId>> {
        Ok(self.lock_runs()?.keys().next_back().copied())
    }

    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>> {
        Ok(self
            .lock_runs()?
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::state_machine::JobStatus;

    fn record(id: i64) -> RunRecord {
        RunRecord::running(RunId::new(id), "job", Utc::now())
    }

    #[test]
    fn reserve_is_insert_if_absent() {
        let store = InMemoryRunStore::new();
        assert!(!store.is_run_id_used(RunId::new(1)).unwrap());
        assert!(store.reserve_run(&record(1)).unwrap());
        assert!(store.is_run_id_used(RunId::new(1)).unwrap());
        assert!(!store.reserve_run(&record(1)).unwrap());
    }

    #[test]
    fn record_run_overwrites() {
        let store = InMemoryRunStore::new();
        store.reserve_run(&record(5)).unwrap();
        let mut done = record(5);
        done.status = JobStatus::Completed;
        store.record_run(&done).unwrap();

        let stored = store.get(RunId::new(5)).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[test]
    fn last_and_list_are_ordered_by_id() {
        let store = InMemoryRunStore::new();
        assert_eq!(store.last_run_id().unwrap(), None);
        for id in [3, 1, 2] {
            store.reserve_run(&record(id)).unwrap();
        }
        assert_eq!(store.last_run_id().unwrap(), Some(RunId::new(3)));

        let ids: Vec<i64> = store
            .list_runs(2)
            .unwrap()
            .iter()
            .map(|r| r.run_id.get())
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
