use crate::error::Error;
use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

pub mod client;
pub mod fusion;
pub mod orchestrator;
pub mod retry;
pub mod staging;

pub use client::{Detector, HttpDetector};
pub use orchestrator::{DetectionOrchestrator, DetectorSet};

/// Which detectors a submission asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionType {
    Animal,
    Gun,
    Both,
}

impl SubmissionType {
    pub fn requires_image(&self) -> bool {
        true
    }

    pub fn requires_audio(&self) -> bool {
        matches!(self, Self::Gun | Self::Both)
    }

    /// Detectors invoked for this type. The gun image classifier only runs for `Gun`.
    pub fn detectors(&self) -> &'static [DetectionKind] {
        match self {
            Self::Animal => &[DetectionKind::AnimalLabel],
            Self::Gun => &[DetectionKind::GunScore, DetectionKind::GunshotFlag],
            Self::Both => &[DetectionKind::AnimalLabel, DetectionKind::GunshotFlag],
        }
    }
}

impl FromStr for SubmissionType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "animal" => Ok(Self::Animal),
            "gun" => Ok(Self::Gun),
            "both" => Ok(Self::Both),
            other => Err(Error::Validation(format!(
                "Unknown submission type: {}",
                other
            ))),
        }
    }
}

impl Display for SubmissionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Animal => write!(f, "animal"),
            Self::Gun => write!(f, "gun"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// An uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Payload {
    pub fn new(file_name: Option<String>, bytes: Vec<u8>) -> Self {
        Self { file_name, bytes }
    }

    /// Extension of the uploaded file name, including the leading dot
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext))
    }

    /// A form part with no bytes and no file name counts as absent
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
            && self
                .file_name
                .as_deref()
                .map_or(true, |name| name.is_empty())
    }
}

/// One upload from a field sensor
#[derive(Debug, Clone)]
pub struct SensorSubmission {
    pub id: Uuid,
    pub submission_type: SubmissionType,
    pub datasource_id: u32,
    pub image: Option<Payload>,
    pub audio: Option<Payload>,
}

impl SensorSubmission {
    pub fn new(
        submission_type: SubmissionType,
        datasource_id: u32,
        image: Option<Payload>,
        audio: Option<Payload>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            submission_type,
            datasource_id,
            image: image.filter(|p| !p.is_empty()),
            audio: audio.filter(|p| !p.is_empty()),
        }
    }

    /// Build a submission from raw form fields, rejecting a bad type or source.
    /// Payload presence is checked by `validate` once processing starts.
    pub fn from_form(
        submission_type: Option<&str>,
        source: Option<&str>,
        image: Option<Payload>,
        audio: Option<Payload>,
    ) -> Result<Self> {
        let invalid = || Error::Validation("Invalid type or missing datasource".to_string());

        let submission_type = submission_type
            .map(str::trim)
            .ok_or_else(invalid)?
            .parse::<SubmissionType>()
            .map_err(|_| invalid())?;

        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;

        let datasource_id = source
            .strip_prefix("datasource")
            .unwrap_or(source)
            .parse::<u32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "Datasource must be a positive integer, got '{}'",
                    source
                ))
            })?;

        Ok(Self::new(submission_type, datasource_id, image, audio))
    }

    /// Check that every payload required by the submission type is present
    pub fn validate(&self) -> Result<()> {
        if self.datasource_id == 0 {
            return Err(
                Error::Validation("Invalid type or missing datasource".to_string()).into(),
            );
        }

        let missing_image = self.submission_type.requires_image() && self.image.is_none();
        let missing_audio = self.submission_type.requires_audio() && self.audio.is_none();

        match self.submission_type {
            SubmissionType::Animal if missing_image => {
                Err(Error::Validation("Missing image file".to_string()).into())
            }
            SubmissionType::Gun | SubmissionType::Both if missing_image || missing_audio => {
                Err(Error::Validation("Missing image or audio file".to_string()).into())
            }
            _ => Ok(()),
        }
    }
}

/// The detector families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionKind {
    AnimalLabel,
    GunScore,
    GunshotFlag,
}

impl Display for DetectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnimalLabel => write!(f, "animal classifier"),
            Self::GunScore => write!(f, "gun classifier"),
            Self::GunshotFlag => write!(f, "gunshot classifier"),
        }
    }
}

/// Normalized output of one detector
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    AnimalLabel(String),
    GunScore(f64),
    GunshotFlag(bool),
}

impl DetectionResult {
    pub fn kind(&self) -> DetectionKind {
        match self {
            Self::AnimalLabel(_) => DetectionKind::AnimalLabel,
            Self::GunScore(_) => DetectionKind::GunScore,
            Self::GunshotFlag(_) => DetectionKind::GunshotFlag,
        }
    }
}

/// Label used when no animal was identified
pub const NO_ANIMAL: &str = "No";

/// The combined verdict for one submission. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub submission_id: Uuid,
    pub datasource_id: u32,
    pub animal: String,
    pub gunshot: bool,
    pub captured_at: NaiveDateTime,
}

impl FusedResult {
    /// `dd-mm-yyyy`
    pub fn date(&self) -> String {
        self.captured_at.format("%d-%m-%Y").to_string()
    }

    /// `HH:MM`, 24 hour clock
    pub fn time(&self) -> String {
        self.captured_at.format("%H:%M").to_string()
    }

    pub fn week(&self) -> u32 {
        week_of_month(self.captured_at.date())
    }

    pub fn gunshot_label(&self) -> &'static str {
        if self.gunshot {
            "Yes"
        } else {
            "No"
        }
    }

    pub fn datasource(&self) -> String {
        self.datasource_id.to_string()
    }

    /// Identifier written to the event log
    pub fn datasource_tag(&self) -> String {
        format!("datasource{}", self.datasource_id)
    }
}

/// Zero-indexed week of the month. Days 29-31 land in week 4; no clipping is applied.
pub fn week_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7
}
