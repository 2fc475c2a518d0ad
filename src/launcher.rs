use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::BatchError;
use crate::job::Job;
use crate::listener::JobListener;
use crate::result::{JobResult, RunRecord};
use crate::state_machine::{Run, RunId, Transition};
use crate::step::StepContext;
use crate::store::{RunStore, StoreError};

/// Hands out fresh run ids: one past the highest id in the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunIdIncrementer;

impl RunIdIncrementer {
    pub const FIRST: RunId = RunId::new(1);

    pub fn next(store: &dyn RunStore) -> Result<RunId, StoreError> {
        Ok(store
            .last_run_id()?
            .map_or(Self::FIRST, RunId::next))
    }
}

/// Runs jobs to a terminal status and notifies listeners.
///
/// Holds no per-run state, so one launcher can drive several runs at once as
/// long as their readers and writers are independent.
pub struct JobLauncher {
    store: Arc<dyn RunStore>,
    listeners: Vec<Arc<dyn JobListener>>,
    cancel: CancellationToken,
}

impl JobLauncher {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            listeners: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a listener; listeners are called in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Token that stops every run of this launcher at its next chunk boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `job` under a fresh id from [`RunIdIncrementer`].
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Store`] when the next id can't be determined; no
    /// run is started in that case.
    pub async fn run_next(&self, job: &mut Job) -> Result<JobResult, BatchError> {
        let run_id = RunIdIncrementer::next(self.store.as_ref())?;
        Ok(self.run_job(job, run_id).await)
    }

    /// Run every step of `job` in order under `run_id`.
    ///
    /// Never fails: every outcome, including a reused `run_id`, comes back as
    /// a [`JobResult`] after all listeners saw it.
    pub async fn run_job(&self, job: &mut Job, run_id: RunId) -> JobResult {
        let mut run = Run::start(run_id, job.name());
        info!(job = %job.name(), run_id = %run_id, steps = job.step_names().len(), "job started");

        let claimed = match self.claim(&run) {
            Ok(true) => true,
            Ok(false) => {
                warn!(job = %job.name(), run_id = %run_id, "run id already used, job not started");
                run.fail(BatchError::DuplicateRun(run_id));
                false
            }
            Err(err) => {
                warn!(job = %job.name(), run_id = %run_id, error = %err, "could not claim run id");
                run.fail(BatchError::Store(err));
                false
            }
        };

        if claimed {
            self.execute_steps(job, &mut run).await;
        }

        let result = run.finish();
        if claimed && let Err(err) = self.store.record_run(&RunRecord::from(&result)) {
            warn!(run_id = %run_id, error = %err, "failed to record run result");
        }
        self.notify(&result).await;
        result
    }

    fn claim(&self, run: &Run) -> Result<bool, StoreError> {
        if self.store.is_run_id_used(run.run_id())? {
            return Ok(false);
        }
        let record = RunRecord::running(run.run_id(), run.job_name(), run.started_at());
        self.store.reserve_run(&record)
    }

    async fn execute_steps(&self, job: &mut Job, run: &mut Run) {
        let ctx = StepContext {
            run_id: run.run_id(),
            job_name: job.name().to_string(),
            cancel: self.cancel.clone(),
        };
        let steps = job.steps_mut();
        let total = steps.len();

        for (index, step) in steps.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                run.fail(BatchError::Cancelled {
                    step: step.name().to_string(),
                });
                return;
            }
            let result = step.run(&ctx).await;
            if let Transition::Complete(status) = run.record_step(result, total - index - 1) {
                info!(job = %ctx.job_name, run_id = %ctx.run_id, status = %status, "job reached terminal status");
                return;
            }
        }
    }

    async fn notify(&self, result: &JobResult) {
        for listener in &self.listeners {
            if let Err(err) = listener.after_job(result).await {
                warn!(
                    job = %result.job_name,
                    run_id = %result.run_id,
                    error = %err,
                    "job listener failed"
                );
            }
        }
    }
}
