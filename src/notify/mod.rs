use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::{Display, Formatter};

pub mod email;
pub mod sms;

pub use email::HttpMailer;
pub use sms::TwilioSms;

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Sms => write!(f, "sms"),
        }
    }
}

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    #[serde(rename = "text")]
    pub body: String,
}

impl EmailMessage {
    /// A message from `sender` that always carries a hidden copy back to `sender`
    pub fn new(sender: &str, to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let bcc = if sender.is_empty() {
            Vec::new()
        } else {
            vec![sender.to_string()]
        };

        Self {
            from: sender.to_string(),
            to: to.into(),
            cc: Vec::new(),
            bcc,
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn with_cc(mut self, cc: Vec<String>) -> Self {
        self.cc = cc;
        self
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()>;
}
