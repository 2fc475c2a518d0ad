//! Collaborator contracts consumed by a chunk step.
//!
//! The engine never implements these itself; sources, transformers and sinks
//! are supplied by the caller. [`memory`] holds small in-memory versions used
//! by the demo and by tests.

pub mod memory;

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::{CollectingWriter, VecReader};

/// A restartable source of input items.
#[async_trait]
pub trait ItemReader: Send {
    type Item: Debug + Send + Sync;

    /// Rewind to the first item. Called once at the start of every step run.
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Pull the next item, or `None` once the source is exhausted.
    async fn read(&mut self) -> Result<Option<Self::Item>>;

    /// Whether a failed or timed-out `read` left the source on the same
    /// record, so the chunk may read it again. A reader that moves past a bad
    /// record must keep the default, or that record is lost on retry.
    fn read_errors_are_retryable(&self) -> bool {
        false
    }
}

/// Maps one input item to one output item, or `None` to skip it.
///
/// Implementations must be pure: a chunk retry transforms the same input again.
#[async_trait]
pub trait ItemProcessor<I, O>: Send + Sync {
    async fn process(&self, item: &I) -> Result<Option<O>>;
}

#[async_trait]
impl<I, O, F> ItemProcessor<I, O> for F
where
    F: Fn(&I) -> Result<Option<O>> + Send + Sync,
    I: Sync,
    O: Send,
{
    async fn process(&self, item: &I) -> Result<Option<O>> {
        self(item)
    }
}

/// Identity transformer for steps that write what they read.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl<T> ItemProcessor<T, T> for PassThrough
where
    T: Clone + Send + Sync,
{
    async fn process(&self, item: &T) -> Result<Option<T>> {
        Ok(Some(item.clone()))
    }
}

/// Durable sink for a whole chunk.
///
/// `write` must persist all of `items` or none of them.
#[async_trait]
pub trait ItemWriter<O>: Send {
    /// Prepare the sink. Called once at the start of every step run.
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, items: &[O]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_act_as_processors() {
        let double = |n: &u32| -> Result<Option<u32>> { Ok(Some(n * 2)) };
        let out = ItemProcessor::<u32, u32>::process(&double, &21).await.unwrap();
        assert_eq!(out, Some(42));
    }

    #[tokio::test]
    async fn closure_can_skip() {
        let odd_only = |n: &u32| -> Result<Option<u32>> { Ok((n % 2 == 1).then_some(*n)) };
        let skipped = ItemProcessor::<u32, u32>::process(&odd_only, &4).await.unwrap();
        let kept = ItemProcessor::<u32, u32>::process(&odd_only, &5).await.unwrap();
        assert_eq!(skipped, None);
        assert_eq!(kept, Some(5));
    }

    #[tokio::test]
    async fn pass_through_clones_input() {
        let item = String::from("row");
        let out = ItemProcessor::<String, String>::process(&PassThrough, &item)
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("row"));
    }
}
