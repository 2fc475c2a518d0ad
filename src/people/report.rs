use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::PeopleDb;
use crate::listener::JobListener;
use crate::result::JobResult;
use crate::state_machine::JobStatus;

/// After a completed import, logs every row now in the `people` table.
#[derive(Clone)]
pub struct PeopleReportListener {
    db: PeopleDb,
}

impl PeopleReportListener {
    pub fn new(db: PeopleDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobListener for PeopleReportListener {
    async fn after_job(&self, result: &JobResult) -> Result<()> {
        if result.status != JobStatus::Completed {
            return Ok(());
        }
        info!(run_id = %result.run_id, "job finished, verifying results");
        for person in self.db.all()? {
            info!("Found <{person}> in the database.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::error::BatchError;
    use crate::people::Person;
    use crate::state_machine::{Run, RunId};
    use crate::step::{StepCounters, StepResult, StepStatus};

    fn db_with_jill() -> PeopleDb {
        let db = PeopleDb::in_memory().unwrap();
        db.insert_batch(&[Person::new("JILL", "DOE")]).unwrap();
        db
    }

    #[tokio::test]
    async fn completed_run_is_reported() {
        let listener = PeopleReportListener::new(db_with_jill());
        let mut run = Run::start(RunId::new(1), "importUserJob");
        run.record_step(
            StepResult {
                name: "step1".into(),
                status: StepStatus::Completed,
                counters: StepCounters::default(),
                started_at: Utc::now(),
                ended_at: Utc::now(),
                error: None,
            },
            0,
        );
        let result = run.finish();
        assert_eq!(result.status, JobStatus::Completed);
        assert!(listener.after_job(&result).await.is_ok());
    }

    #[tokio::test]
    async fn failed_run_is_ignored() {
        let listener = PeopleReportListener::new(db_with_jill());
        let mut failed = Run::start(RunId::new(2), "importUserJob");
        failed.fail(BatchError::DuplicateRun(RunId::new(2)));
        assert!(listener.after_job(&failed.finish()).await.is_ok());
    }
}
