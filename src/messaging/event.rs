use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Event types supported by the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    // Submission lifecycle
    SubmissionReceived,
    SubmissionRejected,
    DetectionAttemptFailed,
    DetectionFailed,
    DetectionFused,
    EventLogged,

    // Alerting
    AlertSuppressed,
    AlertDispatched,
    NotificationSent,
    NotificationFailed,

    // System events
    SystemStartup,
    SystemShutdown,
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubmissionReceived => write!(f, "submission.received"),
            Self::SubmissionRejected => write!(f, "submission.rejected"),
            Self::DetectionAttemptFailed => write!(f, "detection.attempt_failed"),
            Self::DetectionFailed => write!(f, "detection.failed"),
            Self::DetectionFused => write!(f, "detection.fused"),
            Self::EventLogged => write!(f, "detection.logged"),
            Self::AlertSuppressed => write!(f, "alert.suppressed"),
            Self::AlertDispatched => write!(f, "alert.dispatched"),
            Self::NotificationSent => write!(f, "notification.sent"),
            Self::NotificationFailed => write!(f, "notification.failed"),
            Self::SystemStartup => write!(f, "system.startup"),
            Self::SystemShutdown => write!(f, "system.shutdown"),
        }
    }
}

/// Event message structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Unique event ID
    pub id: Uuid,
    /// Event type
    pub event_type: EventType,
    /// Submission the event belongs to, if any
    pub source_id: Option<Uuid>,
    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Event data payload
    pub payload: serde_json::Value,
}

impl EventMessage {
    /// Create a new event message
    pub fn new<T: Serialize>(
        event_type: EventType,
        source_id: Option<Uuid>,
        payload: T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type,
            source_id,
            timestamp: chrono::Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Get the routing key for the event
    pub fn routing_key(&self) -> String {
        match &self.source_id {
            Some(id) => format!("{}.{}", self.event_type, id),
            None => self.event_type.to_string(),
        }
    }
}
