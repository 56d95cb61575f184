use super::staging::StagedFile;
use super::{DetectionKind, DetectionResult, NO_ANIMAL};
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

/// A scoring backend that classifies one staged file
#[async_trait]
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectionKind;

    async fn detect(&self, staged: &StagedFile) -> Result<DetectionResult>;
}

/// Detector backed by an HTTP classifier service
pub struct HttpDetector {
    client: reqwest::Client,
    kind: DetectionKind,
    url: String,
}

impl HttpDetector {
    pub fn new(kind: DetectionKind, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            kind,
            url: url.into(),
        })
    }

    fn field_name(&self) -> &'static str {
        match self.kind {
            DetectionKind::AnimalLabel | DetectionKind::GunScore => "image",
            DetectionKind::GunshotFlag => "audio",
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn kind(&self) -> DetectionKind {
        self.kind
    }

    async fn detect(&self, staged: &StagedFile) -> Result<DetectionResult> {
        let bytes = tokio::fs::read(&staged.path).await.map_err(|e| {
            Error::Io(format!("Failed to read staged file {:?}: {}", staged.path, e))
        })?;

        let form = Form::new()
            .part(
                self.field_name(),
                Part::bytes(bytes).file_name(staged.file_name.clone()),
            )
            .text("path", staged.path.to_string_lossy().to_string());

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detector(format!("{} request failed: {}", self.kind, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Detector(format!(
                "{} returned status {}",
                self.kind,
                resp.status()
            ))
            .into());
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Detector(format!("{} returned invalid JSON: {}", self.kind, e)))?;

        debug!("{} response: {}", self.kind, body);

        parse_response(self.kind, &body)
    }
}

/// Normalize a classifier response.
///
/// Response shapes:
/// - animal: `{"animal": "<label>"}`
/// - gun: `{"Confidence Score": <0..1>}`
/// - gunshot: `{"result": 0 | 1}`
///
/// A missing field takes the classifier's negative value. An `error` field
/// means the backend could not score the file.
pub fn parse_response(kind: DetectionKind, body: &Value) -> Result<DetectionResult> {
    if let Some(err) = body.get("error") {
        let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(Error::Detector(format!("{} reported an error: {}", kind, message)).into());
    }

    match kind {
        DetectionKind::AnimalLabel => {
            let label = match body.get("animal") {
                None | Some(Value::Null) => NO_ANIMAL.to_string(),
                Some(Value::String(label)) => label.clone(),
                Some(other) => {
                    return Err(Error::Detector(format!(
                        "{} returned a non-string label: {}",
                        kind, other
                    ))
                    .into())
                }
            };
            Ok(DetectionResult::AnimalLabel(label))
        }
        DetectionKind::GunScore => {
            let confidence = match body.get("Confidence Score") {
                None | Some(Value::Null) => 0.0,
                Some(value) => value.as_f64().ok_or_else(|| {
                    Error::Detector(format!("{} returned a non-numeric score: {}", kind, value))
                })?,
            };
            if !(0.0..=1.0).contains(&confidence) {
                return Err(Error::Detector(format!(
                    "{} score {} is outside [0, 1]",
                    kind, confidence
                ))
                .into());
            }
            Ok(DetectionResult::GunScore(confidence))
        }
        DetectionKind::GunshotFlag => {
            let flag = match body.get("result") {
                None | Some(Value::Null) => false,
                Some(Value::Bool(flag)) => *flag,
                Some(value) => match value.as_f64() {
                    Some(n) => n == 1.0,
                    None => {
                        return Err(Error::Detector(format!(
                            "{} returned an unexpected result: {}",
                            kind, value
                        ))
                        .into())
                    }
                },
            };
            Ok(DetectionResult::GunshotFlag(flag))
        }
    }
}
