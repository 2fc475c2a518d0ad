//! Chunk-oriented batch job engine.
//!
//! A [`Job`] is an ordered list of steps. Each [`ChunkStep`] pulls items from an
//! [`ItemReader`], maps them through an [`ItemProcessor`] and commits them to an
//! [`ItemWriter`] in fixed-size chunks, one write per chunk. The
//! [`JobLauncher`] runs jobs under unique [`RunId`]s, records run history in a
//! [`RunStore`] and hands every terminal [`JobResult`] to its [`JobListener`]s.

pub mod chunk;
pub mod config;
pub mod error;
pub mod item;
pub mod job;
pub mod launcher;
pub mod listener;
pub mod logging;
pub mod people;
pub mod result;
pub mod state_machine;
pub mod step;
pub mod store;
pub mod ui;

pub use chunk::{ChunkExecutor, ChunkFailure, ChunkOutcome, ChunkSettings, RetryPolicy};
pub use error::BatchError;
pub use item::{ItemProcessor, ItemReader, ItemWriter, PassThrough};
pub use job::{Job, JobBuilder};
pub use launcher::{JobLauncher, RunIdIncrementer};
pub use listener::{JobListener, LoggingListener};
pub use result::{JobResult, RunRecord, StepSummary};
pub use state_machine::{JobStatus, Run, RunId};
pub use step::{ChunkStep, StepContext, StepCounters, StepResult, StepRunner, StepStatus};
pub use store::{InMemoryRunStore, RunStore, SqliteRunStore, StoreError};
