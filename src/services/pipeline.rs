use crate::alerting::{AlertDispatcher, AlertOutcome};
use crate::detection::{DetectionOrchestrator, FusedResult, SensorSubmission};
use crate::events::EventStore;
use crate::messaging::{EventBus, EventType};
use anyhow::Result;
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Detect, log, then alert.
///
/// The event log append completes before the alert decision starts, and
/// alerting runs on its own task so the caller gets its result without
/// waiting on notification transports.
pub struct SubmissionPipeline {
    orchestrator: Arc<DetectionOrchestrator>,
    events: Arc<EventStore>,
    alerts: Arc<AlertDispatcher>,
    event_bus: Arc<EventBus>,
}

impl SubmissionPipeline {
    pub fn new(
        orchestrator: Arc<DetectionOrchestrator>,
        events: Arc<EventStore>,
        alerts: Arc<AlertDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            orchestrator,
            events,
            alerts,
            event_bus,
        }
    }

    /// Record an upload that never became a submission, such as a bad type or source
    pub async fn reject(&self, reason: &anyhow::Error) {
        warn!("Rejected upload: {}", reason);
        self.event_bus
            .emit(
                EventType::SubmissionRejected,
                None,
                json!({ "reason": reason.to_string() }),
            )
            .await;
    }

    pub async fn submit(&self, submission: SensorSubmission) -> Result<FusedResult> {
        let (fused, _alert) = self.submit_tracked(submission).await?;
        Ok(fused)
    }

    /// Like `submit`, also handing back the background alert task
    pub async fn submit_tracked(
        &self,
        submission: SensorSubmission,
    ) -> Result<(FusedResult, JoinHandle<AlertOutcome>)> {
        self.event_bus
            .emit(
                EventType::SubmissionReceived,
                Some(submission.id),
                json!({
                    "type": submission.submission_type,
                    "datasource": submission.datasource_id,
                }),
            )
            .await;

        let fused = self.orchestrator.process(&submission).await?;

        let record = self.events.append(&fused).await.map_err(|e| {
            error!("Failed to log submission {}: {:#}", fused.submission_id, e);
            e
        })?;
        self.event_bus
            .emit(EventType::EventLogged, Some(fused.submission_id), &record)
            .await;

        let alerts = self.alerts.clone();
        let alert_input = fused.clone();
        let alert = tokio::spawn(async move { alerts.maybe_alert(&alert_input).await });

        info!(
            "Submission {} complete: datasource={}, animal={}, gunshot={}",
            fused.submission_id,
            fused.datasource_tag(),
            fused.animal,
            fused.gunshot_label()
        );

        Ok((fused, alert))
    }
}
