use crate::detection::FusedResult;
use crate::error::Error;
use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One row of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub date: String,
    pub time: String,
    pub datasource: String,
    pub animal: String,
    pub gunshot: String,
    pub week: u32,
}

impl From<&FusedResult> for EventRecord {
    fn from(fused: &FusedResult) -> Self {
        Self {
            date: fused.date(),
            time: fused.time(),
            datasource: fused.datasource_tag(),
            animal: fused.animal.clone(),
            gunshot: fused.gunshot_label().to_string(),
            week: fused.week(),
        }
    }
}

/// Append-only CSV log of fused results.
///
/// The header row is written when the file is created or empty. Appends are
/// serialized so rows from concurrent submissions never interleave.
pub struct EventStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, fused: &FusedResult) -> Result<EventRecord> {
        let record = EventRecord::from(fused);
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        let row = record.clone();
        tokio::task::spawn_blocking(move || write_row(&path, &row))
            .await
            .map_err(|e| Error::Internal(format!("Event log writer panicked: {}", e)))??;

        info!(
            "Logged submission {} to {:?} ({}, gunshot: {})",
            fused.submission_id, self.path, record.datasource, record.gunshot
        );

        Ok(record)
    }

    /// Every row currently in the log; a missing file reads as empty
    pub async fn read_all(&self) -> Result<Vec<EventRecord>> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| Error::Internal(format!("Event log reader panicked: {}", e)))?
    }
}

fn write_row(path: &Path, record: &EventRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(Error::from)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Io(format!("Failed to open event log {:?}: {}", path, e)))?;
    let needs_header = file.metadata().map_err(Error::from)?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(record).map_err(Error::from)?;
    writer.flush().map_err(Error::from)?;

    debug!("Appended row to {:?} (header written: {})", path, needs_header);
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<EventRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(Error::from)?;

    let mut records = Vec::new();
    for result in reader.deserialize::<EventRecord>() {
        records.push(result.map_err(Error::from)?);
    }
    Ok(records)
}
