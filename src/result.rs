//! Terminal results of a run and their persisted form.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::state_machine::{JobStatus, RunId};
use crate::step::{StepCounters, StepResult, StepStatus};

/// Finalized outcome of one run, handed to listeners and returned to the caller.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub run_id: RunId,
    pub job_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Steps that ran, in execution order. Steps after a failure are absent.
    pub steps: Vec<StepResult>,
    pub error: Option<Arc<BatchError>>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Counters summed over every step that ran.
    pub fn totals(&self) -> StepCounters {
        self.steps
            .iter()
            .fold(StepCounters::default(), |mut acc, step| {
                acc.read_count += step.counters.read_count;
                acc.write_count += step.counters.write_count;
                acc.skip_count += step.counters.skip_count;
                acc.commit_count += step.counters.commit_count;
                acc.rollback_count += step.counters.rollback_count;
                acc
            })
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Serializable snapshot of one step inside a [`RunRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub status: StepStatus,
    pub counters: StepCounters,
    pub error: Option<String>,
}

/// What the run store keeps about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub job_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepSummary>,
    pub error: Option<String>,
}

impl RunRecord {
    /// Record for a run that has just been claimed.
    pub fn running(run_id: RunId, job_name: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            job_name: job_name.to_string(),
            status: JobStatus::Running,
            started_at,
            ended_at: None,
            steps: Vec::new(),
            error: None,
        }
    }
}

impl From<&JobResult> for RunRecord {
    fn from(result: &JobResult) -> Self {
        Self {
            run_id: result.run_id,
            job_name: result.job_name.clone(),
            status: result.status,
            started_at: result.started_at,
            ended_at: Some(result.ended_at),
            steps: result
                .steps
                .iter()
                .map(|step| StepSummary {
                    name: step.name.clone(),
                    status: step.status,
                    counters: step.counters,
                    error: step.error.as_ref().map(ToString::to_string),
                })
                .collect(),
            error: result.error.as_ref().map(ToString::to_string),
        }
    }
}
