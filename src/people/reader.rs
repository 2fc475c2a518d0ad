use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use csv::{DeserializeRecordsIntoIter, ReaderBuilder, Trim};
use tokio::task;

use super::Person;
use crate::item::ItemReader;

/// Reads `first_name,last_name` rows from a headerless CSV file.
///
/// `open` reopens the file, so every step run starts from the first row.
/// File I/O runs on the blocking pool. A read abandoned by a timeout leaves
/// the reader closed until the next `open`.
pub struct CsvPersonReader {
    path: PathBuf,
    records: Option<DeserializeRecordsIntoIter<File, Person>>,
}

impl CsvPersonReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: None,
        }
    }
}

#[async_trait]
impl ItemReader for CsvPersonReader {
    type Item = Person;

    async fn open(&mut self) -> Result<()> {
        self.records = None;
        let path = self.path.clone();
        let records = task::spawn_blocking(move || {
            ReaderBuilder::new()
                .has_headers(false)
                .trim(Trim::All)
                .from_path(&path)
                .map(|reader| reader.into_deserialize())
                .with_context(|| format!("failed to open {}", path.display()))
        })
        .await
        .context("csv open task panicked")??;
        self.records = Some(records);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Person>> {
        let mut records = self
            .records
            .take()
            .ok_or_else(|| anyhow!("reader for {} was not opened", self.path.display()))?;
        let (records, next) = task::spawn_blocking(move || {
            let next = records.next().transpose();
            (records, next)
        })
        .await
        .context("csv read task panicked")?;
        self.records = Some(records);
        next.map_err(Into::into)
    }
}
