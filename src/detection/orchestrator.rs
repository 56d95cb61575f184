use super::client::{Detector, HttpDetector};
use super::fusion::{fuse, Verdict};
use super::retry::RetryPolicy;
use super::staging::{StagedFile, StagingArea, StagingSlot};
use super::{DetectionKind, DetectionResult, FusedResult, Payload, SensorSubmission, SubmissionType};
use crate::config::DetectionConfig;
use crate::error::Error;
use crate::messaging::{EventBus, EventType};
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// The three detection backends
#[derive(Clone)]
pub struct DetectorSet {
    pub animal: Arc<dyn Detector>,
    pub gun: Arc<dyn Detector>,
    pub gunshot: Arc<dyn Detector>,
}

impl DetectorSet {
    /// HTTP clients for the configured classifier endpoints
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let timeout = config.call_timeout();
        Ok(Self {
            animal: Arc::new(HttpDetector::new(
                DetectionKind::AnimalLabel,
                &config.animal_url,
                timeout,
            )?),
            gun: Arc::new(HttpDetector::new(
                DetectionKind::GunScore,
                &config.gun_url,
                timeout,
            )?),
            gunshot: Arc::new(HttpDetector::new(
                DetectionKind::GunshotFlag,
                &config.gunshot_url,
                timeout,
            )?),
        })
    }
}

/// Turns one sensor submission into a fused verdict.
///
/// The stage-and-detect step is retried as a whole: every attempt re-stages
/// the payloads and re-invokes every detector the submission type needs.
/// Detectors for one attempt run concurrently and fusion waits for all of them.
pub struct DetectionOrchestrator {
    staging: StagingArea,
    detectors: DetectorSet,
    retry: RetryPolicy,
    call_timeout: Duration,
    gun_threshold: f64,
    event_bus: Arc<EventBus>,
}

impl DetectionOrchestrator {
    pub fn new(
        staging: StagingArea,
        detectors: DetectorSet,
        retry: RetryPolicy,
        call_timeout: Duration,
        gun_threshold: f64,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            staging,
            detectors,
            retry,
            call_timeout,
            gun_threshold,
            event_bus,
        }
    }

    pub fn from_config(config: &DetectionConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        Ok(Self::new(
            StagingArea::new(&config.staging_root),
            DetectorSet::from_config(config)?,
            RetryPolicy::new(config.max_attempts, config.retry_backoff()),
            config.call_timeout(),
            config.gun_confidence_threshold,
            event_bus,
        ))
    }

    /// Validate, detect with retries, fuse and stamp the capture time
    pub async fn process(&self, submission: &SensorSubmission) -> Result<FusedResult> {
        if let Err(err) = submission.validate() {
            warn!("Rejected submission {}: {}", submission.id, err);
            self.event_bus
                .emit(
                    EventType::SubmissionRejected,
                    Some(submission.id),
                    json!({ "reason": err.to_string() }),
                )
                .await;
            return Err(err);
        }

        info!(
            "Detecting submission {} (type: {}, datasource: {})",
            submission.id, submission.submission_type, submission.datasource_id
        );

        let outcome = self
            .retry
            .run(move |attempt| async move {
                let result = self.attempt(submission).await;
                if let Err(err) = &result {
                    self.event_bus
                        .emit(
                            EventType::DetectionAttemptFailed,
                            Some(submission.id),
                            json!({ "attempt": attempt, "error": format!("{:#}", err) }),
                        )
                        .await;
                }
                result
            })
            .await;

        if let Err(e) = self.staging.discard(submission.id).await {
            warn!("Failed to clean staging for {}: {}", submission.id, e);
        }

        match outcome {
            Ok(verdict) => {
                let fused = Self::stamp(submission, verdict, Local::now().naive_local());
                info!(
                    "Submission {} fused: animal={}, gunshot={}",
                    submission.id,
                    fused.animal,
                    fused.gunshot_label()
                );
                self.event_bus
                    .emit(
                        EventType::DetectionFused,
                        Some(submission.id),
                        json!({
                            "datasource": fused.datasource_tag(),
                            "animal": fused.animal,
                            "gunshot": fused.gunshot_label(),
                        }),
                    )
                    .await;
                Ok(fused)
            }
            Err(exhausted) => {
                let cause = format!("{:#}", exhausted.last_error);
                error!(
                    "Detection for submission {} failed after {} attempts: {}",
                    submission.id, exhausted.attempts, cause
                );
                self.event_bus
                    .emit(
                        EventType::DetectionFailed,
                        Some(submission.id),
                        json!({ "attempts": exhausted.attempts, "error": cause }),
                    )
                    .await;
                Err(Error::DetectionFailure {
                    attempts: exhausted.attempts,
                    cause,
                }
                .into())
            }
        }
    }

    fn stamp(submission: &SensorSubmission, verdict: Verdict, captured_at: NaiveDateTime) -> FusedResult {
        FusedResult {
            submission_id: submission.id,
            datasource_id: submission.datasource_id,
            animal: verdict.animal,
            gunshot: verdict.gunshot,
            captured_at,
        }
    }

    /// One staging + invocation + fusion pass
    async fn attempt(&self, submission: &SensorSubmission) -> Result<Verdict> {
        let results = match submission.submission_type {
            SubmissionType::Animal => {
                let image = self
                    .stage(submission, StagingSlot::AnimalImage, &submission.image)
                    .await?;
                vec![self.invoke(&self.detectors.animal, &image).await?]
            }
            SubmissionType::Gun => {
                let image = self
                    .stage(submission, StagingSlot::GunImage, &submission.image)
                    .await?;
                let audio = self
                    .stage(submission, StagingSlot::Audio, &submission.audio)
                    .await?;
                let (gun, gunshot) = tokio::try_join!(
                    self.invoke(&self.detectors.gun, &image),
                    self.invoke(&self.detectors.gunshot, &audio),
                )?;
                vec![gun, gunshot]
            }
            SubmissionType::Both => {
                let image = self
                    .stage(submission, StagingSlot::AnimalImage, &submission.image)
                    .await?;
                let audio = self
                    .stage(submission, StagingSlot::Audio, &submission.audio)
                    .await?;
                let (animal, gunshot) = tokio::try_join!(
                    self.invoke(&self.detectors.animal, &image),
                    self.invoke(&self.detectors.gunshot, &audio),
                )?;
                vec![animal, gunshot]
            }
        };

        Ok(fuse(submission.submission_type, &results, self.gun_threshold))
    }

    async fn stage(
        &self,
        submission: &SensorSubmission,
        slot: StagingSlot,
        payload: &Option<Payload>,
    ) -> Result<StagedFile> {
        let payload = payload.as_ref().ok_or_else(|| {
            Error::Validation(format!("Submission {} has no {} payload", submission.id, slot))
        })?;
        self.staging.stage(submission.id, slot, payload).await
    }

    async fn invoke(&self, detector: &Arc<dyn Detector>, staged: &StagedFile) -> Result<DetectionResult> {
        match tokio::time::timeout(self.call_timeout, detector.detect(staged)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Detector(format!(
                "{} timed out after {:?}",
                detector.kind(),
                self.call_timeout
            ))
            .into()),
        }
    }
}
