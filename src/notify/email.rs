use super::{EmailMessage, EmailSender};
use crate::config::NotificationConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::time::Duration;

/// Sends email through an HTTP mail relay that accepts JSON messages
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        Self::new(
            &config.mail_api_url,
            &config.mail_api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(&self.url).json(message);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Mail relay request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "Mail relay returned {}: {}",
                status, body
            ))
            .into());
        }

        info!(
            "Email sent to {} (CC: {}, BCC: {})",
            message.to,
            if message.cc.is_empty() {
                "None".to_string()
            } else {
                message.cc.join(", ")
            },
            message.bcc.join(", ")
        );

        Ok(())
    }
}
