use super::Payload;
use crate::error::Error;
use anyhow::Result;
use log::debug;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

/// Per-modality slot inside a submission's staging folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingSlot {
    AnimalImage,
    GunImage,
    Audio,
}

impl StagingSlot {
    fn base_name(&self) -> &'static str {
        match self {
            Self::AnimalImage => "animal",
            Self::GunImage => "gun",
            Self::Audio => "gunshot",
        }
    }
}

impl Display for StagingSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base_name())
    }
}

/// A payload written to disk and ready for a detector
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub slot: StagingSlot,
    pub path: PathBuf,
    pub file_name: String,
}

/// Staging area keyed by submission id.
///
/// Each submission gets its own folder, so concurrent submissions of the same
/// type never share files. Within a folder a slot holds one file; staging the
/// same slot again overwrites it.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn submission_dir(&self, submission_id: Uuid) -> PathBuf {
        self.root.join(submission_id.to_string())
    }

    /// Write a payload into its slot, keeping the uploaded file's extension
    pub async fn stage(
        &self,
        submission_id: Uuid,
        slot: StagingSlot,
        payload: &Payload,
    ) -> Result<StagedFile> {
        let dir = self.submission_dir(submission_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Io(format!("Failed to create staging folder {:?}: {}", dir, e))
        })?;

        let file_name = format!(
            "{}{}",
            slot.base_name(),
            payload.extension().unwrap_or_default()
        );
        let path = dir.join(&file_name);

        // Drop any earlier file for this slot that carried a different extension
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let existing = entry.path();
            let same_slot = existing
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map_or(false, |stem| stem == slot.base_name());
            if same_slot && existing != path {
                tokio::fs::remove_file(&existing).await?;
            }
        }

        tokio::fs::write(&path, &payload.bytes)
            .await
            .map_err(|e| Error::Io(format!("Failed to stage {} file {:?}: {}", slot, path, e)))?;

        debug!(
            "Staged {} bytes for submission {} at {:?}",
            payload.bytes.len(),
            submission_id,
            path
        );

        Ok(StagedFile {
            slot,
            path,
            file_name,
        })
    }

    /// Remove a submission's staging folder
    pub async fn discard(&self, submission_id: Uuid) -> Result<()> {
        let dir = self.submission_dir(submission_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("Failed to remove {:?}: {}", dir, e)).into()),
        }
    }
}
