//! One read-transform-write cycle with a single commit.
//!
//! [`ChunkExecutor::execute`] pulls items until `chunk_size` of them survived
//! the processor or the reader ran dry, then hands the accumulated batch to
//! the writer in exactly one call. A failed attempt is retried against the
//! same buffered input, so no item is read twice and nothing is written
//! partially.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{BatchError, Operation};
use crate::item::{ItemProcessor, ItemReader, ItemWriter};

/// How many times a failed chunk is attempted again before the step fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed per chunk after its first failed attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// A policy that fails the step on the first chunk error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }

    /// Delay before the given retry attempt.
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Per-step chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkSettings {
    pub chunk_size: NonZeroUsize,
    pub retry: RetryPolicy,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl ChunkSettings {
    pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

    pub fn new(chunk_size: NonZeroUsize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }

    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = Some(limit);
        self
    }
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Counts of one committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkOutcome {
    pub read: u64,
    pub written: u64,
    pub skipped: u64,
    /// Attempts it took to commit, at least 1.
    pub attempts: u32,
    /// The reader reported exhaustion while filling this chunk.
    pub exhausted: bool,
}

impl ChunkOutcome {
    /// Whether the chunk ended with a writer call.
    pub fn wrote(&self) -> bool {
        self.written > 0
    }
}

/// A chunk that rolled back on its last attempt.
#[derive(Debug)]
pub struct ChunkFailure {
    pub error: BatchError,
    /// Attempts made, each one rolled back.
    pub attempts: u32,
}

/// Runs chunks for one step.
pub struct ChunkExecutor<'a> {
    step: &'a str,
    settings: &'a ChunkSettings,
}

impl<'a> ChunkExecutor<'a> {
    pub fn new(step: &'a str, settings: &'a ChunkSettings) -> Self {
        Self { step, settings }
    }

    /// Execute and commit one chunk, retrying it per the [`RetryPolicy`].
    ///
    /// `already_read` is the number of items the step consumed before this
    /// chunk; it only feeds error positions.
    pub async fn execute<R, P, W, O>(
        &self,
        reader: &mut R,
        processor: &P,
        writer: &mut W,
        already_read: u64,
    ) -> Result<ChunkOutcome, ChunkFailure>
    where
        R: ItemReader,
        P: ItemProcessor<R::Item, O>,
        W: ItemWriter<O>,
        O: Send + Sync,
    {
        let mut inputs: Vec<R::Item> = Vec::with_capacity(self.settings.chunk_size.get());
        let mut exhausted = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = self
                .attempt(
                    reader,
                    processor,
                    writer,
                    &mut inputs,
                    &mut exhausted,
                    already_read,
                )
                .await;

            match result {
                Ok((written, skipped)) => {
                    let outcome = ChunkOutcome {
                        read: inputs.len() as u64,
                        written,
                        skipped,
                        attempts: attempt,
                        exhausted,
                    };
                    debug!(
                        step = self.step,
                        read = outcome.read,
                        written = outcome.written,
                        skipped = outcome.skipped,
                        attempts = outcome.attempts,
                        "chunk committed"
                    );
                    return Ok(outcome);
                }
                Err(err)
                    if self.can_retry(&err, reader)
                        && attempt <= self.settings.retry.max_retries =>
                {
                    let delay = self.settings.retry.delay_for_attempt(attempt);
                    warn!(
                        step = self.step,
                        attempt,
                        max_retries = self.settings.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "chunk rolled back, retrying"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                Err(err) => {
                    warn!(step = self.step, attempt, error = %err, "chunk rolled back");
                    return Err(ChunkFailure {
                        error: err,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Read failures are only retried when the reader kept its position.
    fn can_retry<R: ItemReader>(&self, err: &BatchError, reader: &R) -> bool {
        err.is_chunk_level() && (!err.is_read_failure() || reader.read_errors_are_retryable())
    }

    /// One attempt: transform what is buffered, read until full, write once.
    ///
    /// Returns `(written, skipped)` for the committed attempt.
    async fn attempt<R, P, W, O>(
        &self,
        reader: &mut R,
        processor: &P,
        writer: &mut W,
        inputs: &mut Vec<R::Item>,
        exhausted: &mut bool,
        already_read: u64,
    ) -> Result<(u64, u64), BatchError>
    where
        R: ItemReader,
        P: ItemProcessor<R::Item, O>,
        W: ItemWriter<O>,
        O: Send + Sync,
    {
        let chunk_size = self.settings.chunk_size.get();
        let mut outputs: Vec<O> = Vec::with_capacity(chunk_size);
        let mut skipped = 0u64;

        for item in inputs.iter() {
            match self.transform(processor, item).await? {
                Some(out) => outputs.push(out),
                None => skipped += 1,
            }
        }

        while outputs.len() < chunk_size && !*exhausted {
            let position = already_read + inputs.len() as u64 + 1;
            match self.read(reader, position).await? {
                Some(item) => {
                    let transformed = self.transform(processor, &item).await;
                    inputs.push(item);
                    match transformed? {
                        Some(out) => outputs.push(out),
                        None => skipped += 1,
                    }
                }
                None => *exhausted = true,
            }
        }

        if !outputs.is_empty() {
            self.write(writer, &outputs).await?;
        }
        Ok((outputs.len() as u64, skipped))
    }

    async fn read<R: ItemReader>(
        &self,
        reader: &mut R,
        position: u64,
    ) -> Result<Option<R::Item>, BatchError> {
        let result = match self.settings.read_timeout {
            Some(limit) => timeout(limit, reader.read())
                .await
                .map_err(|_| self.timed_out(Operation::Read, limit))?,
            None => reader.read().await,
        };
        result.map_err(|source| BatchError::SourceRead {
            step: self.step.to_string(),
            position,
            source,
        })
    }

    async fn transform<I, O, P>(&self, processor: &P, item: &I) -> Result<Option<O>, BatchError>
    where
        I: std::fmt::Debug,
        P: ItemProcessor<I, O>,
    {
        processor
            .process(item)
            .await
            .map_err(|source| BatchError::Transform {
                step: self.step.to_string(),
                item: format!("{item:?}"),
                source,
            })
    }

    async fn write<O, W: ItemWriter<O>>(&self, writer: &mut W, items: &[O]) -> Result<(), BatchError> {
        let result = match self.settings.write_timeout {
            Some(limit) => timeout(limit, writer.write(items))
                .await
                .map_err(|_| self.timed_out(Operation::Write, limit))?,
            None => writer.write(items).await,
        };
        result.map_err(|source| BatchError::SinkWrite {
            step: self.step.to_string(),
            items: items.len(),
            source,
        })
    }

    fn timed_out(&self, operation: Operation, limit: Duration) -> BatchError {
        BatchError::Timeout {
            step: self.step.to_string(),
            operation,
            timeout_ms: limit.as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{CollectingWriter, PassThrough, VecReader};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    fn settings(chunk_size: usize) -> ChunkSettings {
        ChunkSettings::new(NonZeroUsize::new(chunk_size).unwrap())
    }

    /// Fails the first `failures` writes, then delegates.
    struct FlakyWriter {
        failures: u32,
        calls: u32,
        inner: CollectingWriter<u32>,
    }

    #[async_trait]
    impl ItemWriter<u32> for FlakyWriter {
        async fn write(&mut self, items: &[u32]) -> Result<()> {
            self.calls += 1;
            if self.calls <= self.failures {
                return Err(anyhow!("write rejected"));
            }
            self.inner.write(items).await
        }
    }

    /// Fails the read at `fail_at` (1-based) exactly once.
    struct HiccupReader {
        inner: VecReader<u32>,
        reads: u32,
        fail_at: u32,
        failed: bool,
    }

    #[async_trait]
    impl ItemReader for HiccupReader {
        type Item = u32;

        async fn read(&mut self) -> Result<Option<u32>> {
            self.reads += 1;
            if self.reads == self.fail_at && !self.failed {
                self.failed = true;
                return Err(anyhow!("socket closed"));
            }
            self.inner.read().await
        }

        fn read_errors_are_retryable(&self) -> bool {
            true
        }
    }

    /// Drops the record it fails on, like a parser that skips a bad line.
    struct LossyReader {
        inner: VecReader<u32>,
        fail_at: u32,
        reads: u32,
    }

    #[async_trait]
    impl ItemReader for LossyReader {
        type Item = u32;

        async fn read(&mut self) -> Result<Option<u32>> {
            self.reads += 1;
            let next = self.inner.read().await?;
            if self.reads == self.fail_at {
                return Err(anyhow!("malformed record"));
            }
            Ok(next)
        }
    }

    #[test]
    fn retry_policy_backoff() {
        let policy = RetryPolicy {
            max_retries: 4,
            base_delay_ms: 100,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(RetryPolicy::default().delay_for_attempt(3), Duration::ZERO);

        let huge = RetryPolicy {
            max_retries: 80,
            base_delay_ms: u64::MAX / 2,
        };
        let delay = huge.delay_for_attempt(70);
        assert_eq!(delay, Duration::from_millis(u64::MAX));
        assert_eq!(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), u64::MAX);
    }

    #[test]
    fn default_settings() {
        let settings = ChunkSettings::default();
        assert_eq!(settings.chunk_size.get(), 10);
        assert_eq!(settings.retry.max_retries, 1);
        assert!(settings.read_timeout.is_none());
    }

    #[tokio::test]
    async fn fills_a_chunk_then_stops_reading() {
        let settings = settings(3);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new((1..=5).collect::<Vec<u32>>());
        let mut writer = CollectingWriter::<u32>::new();

        let first = exec
            .execute(&mut reader, &PassThrough, &mut writer, 0)
            .await
            .unwrap();
        assert_eq!((first.read, first.written, first.exhausted), (3, 3, false));

        let second = exec
            .execute(&mut reader, &PassThrough, &mut writer, 3)
            .await
            .unwrap();
        assert_eq!((second.read, second.written, second.exhausted), (2, 2, true));
        assert_eq!(writer.batch_sizes(), vec![3, 2]);
    }

    #[tokio::test]
    async fn skips_do_not_count_toward_chunk_size() {
        let settings = settings(2);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new(vec![1u32, 2, 3, 4]);
        let mut writer = CollectingWriter::<u32>::new();
        let odd_only = |n: &u32| -> Result<Option<u32>> { Ok((n % 2 == 1).then_some(*n)) };

        let outcome = exec
            .execute(&mut reader, &odd_only, &mut writer, 0)
            .await
            .unwrap();
        assert_eq!(outcome.read, 3);
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(writer.batches(), vec![vec![1, 3]]);
    }

    #[tokio::test]
    async fn all_skipped_tail_commits_without_write() {
        let settings = settings(4);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new(vec![2u32, 4]);
        let mut writer = CollectingWriter::<u32>::new();
        let odd_only = |n: &u32| -> Result<Option<u32>> { Ok((n % 2 == 1).then_some(*n)) };

        let outcome = exec
            .execute(&mut reader, &odd_only, &mut writer, 0)
            .await
            .unwrap();
        assert!(!outcome.wrote());
        assert!(outcome.exhausted);
        assert_eq!(outcome.skipped, 2);
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_retried_with_the_same_batch() {
        let settings = settings(5);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new((1..=5).collect::<Vec<u32>>());
        let collected = CollectingWriter::<u32>::new();
        let mut writer = FlakyWriter {
            failures: 1,
            calls: 0,
            inner: collected.clone(),
        };

        let outcome = exec
            .execute(&mut reader, &PassThrough, &mut writer, 0)
            .await
            .unwrap();
        assert_eq!(writer.calls, 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.written, 5);
        assert_eq!(collected.items(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn second_consecutive_write_failure_escalates() {
        let settings = settings(5);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new((1..=5).collect::<Vec<u32>>());
        let mut writer = FlakyWriter {
            failures: 2,
            calls: 0,
            inner: CollectingWriter::new(),
        };

        let err = exec
            .execute(&mut reader, &PassThrough, &mut writer, 0)
            .await
            .unwrap_err()
            .error;
        assert!(matches!(err, BatchError::SinkWrite { items: 5, .. }));
        assert_eq!(writer.calls, 2);
    }

    #[tokio::test]
    async fn no_retry_policy_fails_on_first_error() {
        let settings = settings(5).with_retry(RetryPolicy::none());
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new(vec![1u32]);
        let mut writer = FlakyWriter {
            failures: 1,
            calls: 0,
            inner: CollectingWriter::new(),
        };

        assert!(exec
            .execute(&mut reader, &PassThrough, &mut writer, 0)
            .await
            .is_err());
        assert_eq!(writer.calls, 1);
    }

    #[tokio::test]
    async fn read_failure_keeps_buffered_items() {
        let settings = settings(4);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = HiccupReader {
            inner: VecReader::new(vec![10u32, 20, 30, 40]),
            reads: 0,
            fail_at: 3,
            failed: false,
        };
        let mut writer = CollectingWriter::<u32>::new();

        let outcome = exec
            .execute(&mut reader, &PassThrough, &mut writer, 0)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.read, 4);
        assert_eq!(writer.batches(), vec![vec![10, 20, 30, 40]]);
    }

    #[tokio::test]
    async fn read_failure_is_not_retried_past_a_lost_record() {
        let settings = settings(4);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = LossyReader {
            inner: VecReader::new(vec![1u32, 2, 3]),
            fail_at: 2,
            reads: 0,
        };
        let mut writer = CollectingWriter::<u32>::new();

        let failure = exec
            .execute(&mut reader, &PassThrough, &mut writer, 0)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(matches!(failure.error, BatchError::SourceRead { position: 2, .. }));
        assert_eq!(reader.reads, 2);
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn transform_failure_aborts_without_write() {
        let settings = settings(3);
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new(vec![1u32, 2, 3]);
        let mut writer = CollectingWriter::<u32>::new();
        let reject_two = |n: &u32| -> Result<Option<u32>> {
            if *n == 2 {
                Err(anyhow!("cannot map 2"))
            } else {
                Ok(Some(*n))
            }
        };

        let err = exec
            .execute(&mut reader, &reject_two, &mut writer, 0)
            .await
            .unwrap_err()
            .error;
        match err {
            BatchError::Transform { item, .. } => assert_eq!(item, "2"),
            other => panic!("expected transform error, got {other:?}"),
        }
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn read_error_reports_step_position() {
        let settings = settings(2).with_retry(RetryPolicy::none());
        let exec = ChunkExecutor::new("load", &settings);
        let mut reader = HiccupReader {
            inner: VecReader::new(vec![1u32, 2]),
            reads: 0,
            fail_at: 2,
            failed: false,
        };
        let mut writer = CollectingWriter::<u32>::new();

        let err = exec
            .execute(&mut reader, &PassThrough, &mut writer, 40)
            .await
            .unwrap_err()
            .error;
        assert!(matches!(err, BatchError::SourceRead { position: 42, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_times_out() {
        struct StalledWriter;

        #[async_trait]
        impl ItemWriter<u32> for StalledWriter {
            async fn write(&mut self, _items: &[u32]) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let settings = settings(2)
            .with_retry(RetryPolicy::none())
            .with_write_timeout(Duration::from_millis(50));
        let exec = ChunkExecutor::new("s", &settings);
        let mut reader = VecReader::new(vec![1u32, 2]);

        let err = exec
            .execute(&mut reader, &PassThrough, &mut StalledWriter, 0)
            .await
            .unwrap_err()
            .error;
        assert!(matches!(
            err,
            BatchError::Timeout {
                operation: Operation::Write,
                timeout_ms: 50,
                ..
            }
        ));
    }
}
