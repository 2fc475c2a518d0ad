use std::collections::HashSet;

use crate::error::BatchError;
use crate::step::StepRunner;

/// A named, ordered list of steps. Always holds at least one step.
pub struct Job {
    name: String,
    steps: Vec<Box<dyn StepRunner>>,
}

impl Job {
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Box<dyn StepRunner>] {
        &mut self.steps
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

pub struct JobBuilder {
    name: String,
    steps: Vec<Box<dyn StepRunner>>,
}

impl JobBuilder {
    /// Append a step; steps run in the order they are added.
    pub fn step(mut self, step: impl StepRunner + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn build(self) -> Result<Job, BatchError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("job name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(self.invalid("a job needs at least one step"));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(self.invalid(&format!("step `{}` is declared twice", step.name())));
            }
        }
        Ok(Job {
            name: self.name,
            steps: self.steps,
        })
    }

    fn invalid(&self, reason: &str) -> BatchError {
        BatchError::InvalidJob {
            job: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{CollectingWriter, PassThrough, VecReader};
    use crate::step::ChunkStep;

    fn step(name: &str) -> ChunkStep<VecReader<u8>, PassThrough, CollectingWriter<u8>, u8> {
        ChunkStep::new(name, VecReader::new(vec![1]), PassThrough, CollectingWriter::new())
    }

    #[test]
    fn keeps_declared_order() {
        let job = Job::builder("import")
            .step(step("extract"))
            .step(step("load"))
            .build()
            .unwrap();
        assert_eq!(job.name(), "import");
        assert_eq!(job.step_names(), vec!["extract", "load"]);
    }

    #[test]
    fn rejects_job_without_steps() {
        let err = Job::builder("empty").build().unwrap_err();
        assert!(matches!(err, BatchError::InvalidJob { ref job, .. } if job == "empty"));
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let err = Job::builder("dup")
            .step(step("a"))
            .step(step("a"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"), "got: {err}");
    }

    #[test]
    fn rejects_blank_name() {
        assert!(Job::builder("  ").step(step("a")).build().is_err());
    }
}
