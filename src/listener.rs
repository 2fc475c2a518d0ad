//! Completion hooks invoked once per run.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::result::JobResult;

/// Receives the finalized result of every run.
///
/// Called exactly once per run, after the status is settled and before the
/// launcher returns. Errors are logged by the launcher and never change the
/// run's outcome.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn after_job(&self, result: &JobResult) -> Result<()>;
}

/// Logs a one-line summary per step.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

#[async_trait]
impl JobListener for LoggingListener {
    async fn after_job(&self, result: &JobResult) -> Result<()> {
        for step in &result.steps {
            info!(
                job = %result.job_name,
                run_id = %result.run_id,
                step = %step.name,
                status = %step.status,
                read = step.counters.read_count,
                written = step.counters.write_count,
                skipped = step.counters.skip_count,
                rollbacks = step.counters.rollback_count,
                "step summary"
            );
        }
        match &result.error {
            None => info!(
                job = %result.job_name,
                run_id = %result.run_id,
                status = %result.status,
                duration_ms = result.duration_ms(),
                "job finished"
            ),
            Some(error) => warn!(
                job = %result.job_name,
                run_id = %result.run_id,
                status = %result.status,
                duration_ms = result.duration_ms(),
                error = %error,
                "job finished"
            ),
        }
        Ok(())
    }
}
