//! Step controller: drives chunks until the reader is exhausted.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chunk::{ChunkExecutor, ChunkOutcome, ChunkSettings};
use crate::error::BatchError;
use crate::item::{ItemProcessor, ItemReader, ItemWriter};
use crate::state_machine::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Completed => write!(f, "COMPLETED"),
            StepStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Per-step execution counters. Only committed chunks are counted in
/// `read_count`, `write_count` and `skip_count`.
///
/// `commit_count` is the number of successful sink writes. A chunk that ends
/// without a write (every item skipped, or the empty tail at exhaustion)
/// still merges its counts but is not a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub skip_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
}

impl StepCounters {
    fn absorb(&mut self, chunk: &ChunkOutcome) {
        self.read_count += chunk.read;
        self.write_count += chunk.written;
        self.skip_count += chunk.skipped;
        if chunk.wrote() {
            self.commit_count += 1;
        }
        self.rollback_count += u64::from(chunk.attempts.saturating_sub(1));
    }
}

/// Finished step, successful or not.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub counters: StepCounters,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error: Option<Arc<BatchError>>,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// What a step knows about the run executing it.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: RunId,
    pub job_name: String,
    /// Checked between chunks only.
    pub cancel: CancellationToken,
}

/// A unit of work a job can sequence.
#[async_trait]
pub trait StepRunner: Send {
    fn name(&self) -> &str;

    async fn run(&mut self, ctx: &StepContext) -> StepResult;
}

/// Chunk-oriented step bound to one reader, processor and writer.
pub struct ChunkStep<R, P, W, O> {
    name: String,
    reader: R,
    processor: P,
    writer: W,
    settings: ChunkSettings,
    _output: PhantomData<fn() -> O>,
}

impl<R, P, W, O> ChunkStep<R, P, W, O>
where
    R: ItemReader,
    P: ItemProcessor<R::Item, O>,
    W: ItemWriter<O>,
    O: Send + Sync,
{
    pub fn new(name: impl Into<String>, reader: R, processor: P, writer: W) -> Self {
        Self {
            name: name.into(),
            reader,
            processor,
            writer,
            settings: ChunkSettings::default(),
            _output: PhantomData,
        }
    }

    pub fn with_settings(mut self, settings: ChunkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ChunkSettings {
        &self.settings
    }

    async fn drive(&mut self, ctx: &StepContext, counters: &mut StepCounters) -> Result<(), BatchError> {
        self.reader
            .open()
            .await
            .map_err(|source| BatchError::SourceRead {
                step: self.name.clone(),
                position: 0,
                source,
            })?;
        self.writer
            .open()
            .await
            .map_err(|source| BatchError::SinkWrite {
                step: self.name.clone(),
                items: 0,
                source,
            })?;

        let executor = ChunkExecutor::new(&self.name, &self.settings);
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(BatchError::Cancelled {
                    step: self.name.clone(),
                });
            }
            match executor
                .execute(
                    &mut self.reader,
                    &self.processor,
                    &mut self.writer,
                    counters.read_count,
                )
                .await
            {
                Ok(chunk) => {
                    counters.absorb(&chunk);
                    if chunk.exhausted {
                        return Ok(());
                    }
                }
                Err(failure) => {
                    counters.rollback_count += u64::from(failure.attempts);
                    return Err(failure.error);
                }
            }
        }
    }
}

#[async_trait]
impl<R, P, W, O> StepRunner for ChunkStep<R, P, W, O>
where
    R: ItemReader,
    P: ItemProcessor<R::Item, O>,
    W: ItemWriter<O>,
    O: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, ctx: &StepContext) -> StepResult {
        let started_at = Utc::now();
        let mut counters = StepCounters::default();
        info!(
            job = %ctx.job_name,
            run_id = %ctx.run_id,
            step = %self.name,
            chunk_size = self.settings.chunk_size.get(),
            "step started"
        );

        let outcome = self.drive(ctx, &mut counters).await;
        let (status, error) = match outcome {
            Ok(()) => {
                info!(
                    step = %self.name,
                    read = counters.read_count,
                    written = counters.write_count,
                    skipped = counters.skip_count,
                    "step completed"
                );
                (StepStatus::Completed, None)
            }
            Err(err) => {
                warn!(
                    step = %self.name,
                    read = counters.read_count,
                    written = counters.write_count,
                    error = %err,
                    "step failed"
                );
                (StepStatus::Failed, Some(Arc::new(err)))
            }
        };

        StepResult {
            name: self.name.clone(),
            status,
            counters,
            started_at,
            ended_at: Utc::now(),
            error,
        }
    }
}
