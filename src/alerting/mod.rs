use crate::db::repositories::users::UserStore;
use crate::detection::{FusedResult, NO_ANIMAL};
use crate::messaging::{EventBus, EventType};
use crate::notify::{Channel, EmailMessage, EmailSender, SmsSender};
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub mod zones;

pub use zones::{ZoneRecord, ZoneTable};

pub const ALERT_SUBJECT: &str = "⚠ THREAT ALERT: Wildlife Monitoring System ⚠";

/// A threat raised for one submission at one zone
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub submission_id: Uuid,
    pub animal: String,
    pub zone: ZoneRecord,
    pub raised_at: NaiveDateTime,
}

impl AlertEvent {
    pub fn new(fused: &FusedResult, zone: &ZoneRecord, raised_at: NaiveDateTime) -> Self {
        Self {
            submission_id: fused.submission_id,
            animal: fused.animal.clone(),
            zone: zone.clone(),
            raised_at,
        }
    }

    pub fn animal_display(&self) -> &str {
        if self.animal == NO_ANIMAL {
            "None"
        } else {
            &self.animal
        }
    }

    pub fn timestamp(&self) -> String {
        self.raised_at.format("%Y-%m-%d %I:%M:%S %p").to_string()
    }

    pub fn email_body(&self) -> String {
        format!(
            "Sent from WildWatch System - ⚠ THREAT ALERT ⚠\n\
             \n\
             Type: Threat Detected\n\
             Description: Human activity detected in a protected area.\n\
             Data Source: {} (Coordinates: {})\n\
             Animal Involved: {}\n\
             Time: {}\n\
             \n\
             Please take necessary precautions.\n\
             \n\
             Regards,\n\
             Team WildWatch\n",
            self.zone.zone_name,
            self.zone.coordinates(),
            self.animal_display(),
            self.timestamp()
        )
    }

    pub fn sms_body(&self) -> String {
        format!(
            "⚠ ALERT! Suspicious activity detected.\n\
             Zone: {}\n\
             📍 Coordinates: {}\n\
             🐾 Animal: {}\n\
             ⏰ {}\n\
             Take action! - WildWatch",
            self.zone.zone_name,
            self.zone.coordinates(),
            self.animal_display(),
            self.timestamp()
        )
    }
}

/// What the alert decision did for one submission
#[derive(Debug)]
pub enum AlertOutcome {
    NoThreat,
    Suppressed(String),
    /// Channel deliveries running in the background
    Dispatched(Vec<JoinHandle<()>>),
}

impl AlertOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_))
    }

    /// Wait for background deliveries; a no-op for the other outcomes
    pub async fn finished(self) {
        if let Self::Dispatched(tasks) = self {
            for task in tasks {
                if let Err(e) = task.await {
                    error!("Notification task failed: {}", e);
                }
            }
        }
    }
}

/// Decides whether a fused result is a threat and fans the alert out.
///
/// Email and SMS run as independent tasks; neither waits on the other and
/// failures are logged and published, never returned.
pub struct AlertDispatcher {
    zones: Arc<ZoneTable>,
    users: Arc<dyn UserStore>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    sender_email: String,
    event_bus: Arc<EventBus>,
}

impl AlertDispatcher {
    pub fn new(
        zones: Arc<ZoneTable>,
        users: Arc<dyn UserStore>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        sender_email: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            zones,
            users,
            email,
            sms,
            sender_email: sender_email.into(),
            event_bus,
        }
    }

    pub async fn maybe_alert(&self, fused: &FusedResult) -> AlertOutcome {
        if !fused.gunshot {
            info!("Submission {}: no threat, no alert", fused.submission_id);
            return AlertOutcome::NoThreat;
        }

        let zone = match self.zones.resolve(fused.datasource_id) {
            Ok(zone) => zone.clone(),
            Err(e) => {
                warn!("Submission {}: alert suppressed: {}", fused.submission_id, e);
                return self.suppress(fused, e.to_string()).await;
            }
        };

        let alert = AlertEvent::new(fused, &zone, Local::now().naive_local());

        let (emails, phones) = match tokio::try_join!(
            self.users.list_recipient_emails(),
            self.users.list_recipient_phones()
        ) {
            Ok(recipients) => recipients,
            Err(e) => {
                error!("Failed to load alert recipients: {:#}", e);
                return self
                    .suppress(fused, format!("Failed to load recipients: {}", e))
                    .await;
            }
        };

        if emails.is_empty() && phones.is_empty() {
            warn!("No recipients registered. Alert not sent.");
            return self.suppress(fused, "No recipients registered".to_string()).await;
        }

        let mut tasks = Vec::new();

        if let Some((primary, others)) = emails.split_first() {
            let message = EmailMessage::new(
                &self.sender_email,
                primary.clone(),
                ALERT_SUBJECT,
                alert.email_body(),
            )
            .with_cc(others.to_vec());
            tasks.push(self.spawn_email(fused.submission_id, message));
        } else {
            warn!("No emails found. Alert email not sent.");
        }

        if phones.is_empty() {
            warn!("No phone numbers found. Alert SMS not sent.");
        } else {
            tasks.push(self.spawn_sms(fused.submission_id, phones.clone(), alert.sms_body()));
        }

        info!(
            "Submission {}: alert dispatched for {} ({} emails, {} phones)",
            fused.submission_id,
            zone.zone_name,
            emails.len(),
            phones.len()
        );
        self.event_bus
            .emit(
                EventType::AlertDispatched,
                Some(fused.submission_id),
                json!({
                    "zone": zone.zone_name,
                    "coordinates": zone.coordinates(),
                    "animal": alert.animal_display(),
                    "emails": emails.len(),
                    "phones": phones.len(),
                }),
            )
            .await;

        AlertOutcome::Dispatched(tasks)
    }

    async fn suppress(&self, fused: &FusedResult, reason: String) -> AlertOutcome {
        self.event_bus
            .emit(
                EventType::AlertSuppressed,
                Some(fused.submission_id),
                json!({ "datasource": fused.datasource_tag(), "reason": reason }),
            )
            .await;
        AlertOutcome::Suppressed(reason)
    }

    fn spawn_email(&self, submission_id: Uuid, message: EmailMessage) -> JoinHandle<()> {
        let email = self.email.clone();
        let bus = self.event_bus.clone();
        tokio::spawn(async move {
            let result = email.send_email(&message).await;
            report(&bus, submission_id, Channel::Email, &message.to, result).await;
        })
    }

    fn spawn_sms(&self, submission_id: Uuid, phones: Vec<String>, body: String) -> JoinHandle<()> {
        let sms = self.sms.clone();
        let bus = self.event_bus.clone();
        tokio::spawn(async move {
            for phone in &phones {
                let result = sms.send_sms(phone, &body).await;
                report(&bus, submission_id, Channel::Sms, phone, result).await;
            }
        })
    }
}

async fn report(
    bus: &EventBus,
    submission_id: Uuid,
    channel: Channel,
    recipient: &str,
    result: anyhow::Result<()>,
) {
    match result {
        Ok(()) => {
            bus.emit(
                EventType::NotificationSent,
                Some(submission_id),
                json!({ "channel": channel, "to": recipient }),
            )
            .await
        }
        Err(e) => {
            error!("Error sending {} to {}: {:#}", channel, recipient, e);
            bus.emit(
                EventType::NotificationFailed,
                Some(submission_id),
                json!({ "channel": channel, "to": recipient, "error": e.to_string() }),
            )
            .await
        }
    }
}
