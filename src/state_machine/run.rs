use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{JobStatus, Transition};
use crate::error::BatchError;
use crate::result::JobResult;
use crate::step::StepResult;

/// Identifies one execution of a job. Never reused, not even for reruns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(i64);

impl RunId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// The id following this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RunId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A run in progress. Consumed by [`Run::finish`] into an immutable [`JobResult`].
#[derive(Debug)]
pub struct Run {
    run_id: RunId,
    job_name: String,
    status: JobStatus,
    started_at: DateTime<Utc>,
    steps: Vec<StepResult>,
    error: Option<Arc<BatchError>>,
}

impl Run {
    pub fn start(run_id: RunId, job_name: impl Into<String>) -> Self {
        Self {
            run_id,
            job_name: job_name.into(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Feed a finished step into the run.
    ///
    /// A failed step fails the run; the last successful step completes it.
    /// Once terminal, further steps are ignored.
    pub fn record_step(&mut self, step: StepResult, remaining: usize) -> Transition {
        if self.status.is_terminal() {
            return Transition::Complete(self.status);
        }
        let failure = step.error.clone();
        self.steps.push(step);

        match failure {
            Some(error) => {
                self.error = Some(error);
                self.move_to(JobStatus::Failed)
            }
            None if remaining == 0 => self.move_to(JobStatus::Completed),
            None => Transition::Continue,
        }
    }

    /// Fail the run outside of any step (duplicate id, cancellation, store failure).
    pub fn fail(&mut self, error: BatchError) -> Transition {
        if self.status.is_terminal() {
            return Transition::Complete(self.status);
        }
        self.error = Some(Arc::new(error));
        self.move_to(JobStatus::Failed)
    }

    /// Seal the run. A run that never reached a terminal status is sealed as FAILED.
    pub fn finish(mut self) -> JobResult {
        if !self.status.is_terminal() {
            self.move_to(JobStatus::Failed);
        }
        JobResult {
            run_id: self.run_id,
            job_name: self.job_name,
            status: self.status,
            started_at: self.started_at,
            ended_at: Utc::now(),
            steps: self.steps,
            error: self.error,
        }
    }

    fn move_to(&mut self, next: JobStatus) -> Transition {
        if self.status.can_transition_to(next) {
            self.status = next;
        }
        Transition::Complete(self.status)
    }
}
