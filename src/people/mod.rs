//! The `importUserJob` pipeline: headerless CSV of names in, upper-cased rows
//! in a `people` table out.

pub mod db;
pub mod processor;
pub mod reader;
pub mod report;
pub mod writer;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkSettings;
use crate::error::BatchError;
use crate::job::Job;
use crate::step::ChunkStep;

pub use db::PeopleDb;
pub use processor::UppercaseProcessor;
pub use reader::CsvPersonReader;
pub use report::PeopleReportListener;
pub use writer::SqlitePeopleWriter;

pub const JOB_NAME: &str = "importUserJob";
pub const STEP_NAME: &str = "step1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "firstName: {}, lastName: {}", self.first_name, self.last_name)
    }
}

/// Single-step job reading `csv_path` into `db`.
pub fn import_job(
    csv_path: impl Into<PathBuf>,
    db: PeopleDb,
    settings: ChunkSettings,
) -> Result<Job, BatchError> {
    let step = ChunkStep::new(
        STEP_NAME,
        CsvPersonReader::new(csv_path),
        UppercaseProcessor,
        SqlitePeopleWriter::new(db),
    )
    .with_settings(settings);
    Job::builder(JOB_NAME).step(step).build()
}
