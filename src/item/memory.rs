use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::{ItemReader, ItemWriter};

/// Reads a fixed list of items, restarting from the top on every `open`.
#[derive(Debug, Clone)]
pub struct VecReader<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> VecReader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }
}

#[async_trait]
impl<T> ItemReader for VecReader<T>
where
    T: Clone + Debug + Send + Sync,
{
    type Item = T;

    async fn open(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<T>> {
        let next = self.items.get(self.cursor).cloned();
        if next.is_some() {
            self.cursor += 1;
        }
        Ok(next)
    }
}

/// Keeps every committed batch in memory.
///
/// Clones share the same storage, so a test can hand one clone to a step
/// and inspect the other afterwards.
#[derive(Debug)]
pub struct CollectingWriter<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T> Clone for CollectingWriter<T> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
        }
    }
}

impl<T> Default for CollectingWriter<T> {
    fn default() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> CollectingWriter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed batches in write order.
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.batches
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Sizes of the committed batches in write order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(Vec::len).collect()
    }

    /// All committed items, flattened.
    pub fn items(&self) -> Vec<T> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl<T> ItemWriter<T> for CollectingWriter<T>
where
    T: Clone + Send + Sync,
{
    async fn write(&mut self, items: &[T]) -> Result<()> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| anyhow!("collecting writer lock poisoned"))?;
        batches.push(items.to_vec());
        Ok(())
    }
}
