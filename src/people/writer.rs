use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::task;

use super::{PeopleDb, Person};
use crate::item::ItemWriter;

/// Inserts each chunk into `people` inside a single transaction.
///
/// The insert runs on the blocking pool. If the write future is dropped, for
/// instance by a write timeout, the transaction rolls back instead of
/// committing rows the chunk already counts as failed.
#[derive(Clone)]
pub struct SqlitePeopleWriter {
    db: PeopleDb,
}

impl SqlitePeopleWriter {
    pub fn new(db: PeopleDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemWriter<Person> for SqlitePeopleWriter {
    async fn write(&mut self, items: &[Person]) -> Result<()> {
        let db = self.db.clone();
        let people = items.to_vec();
        let guard = AbandonOnDrop(Arc::new(AtomicBool::new(false)));
        let abandoned = guard.0.clone();

        task::spawn_blocking(move || db.insert_batch_unless(&people, &abandoned))
            .await
            .context("people insert task panicked")?
    }
}

/// Raises the flag when the owning write future goes away.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
