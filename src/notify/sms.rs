use super::SmsSender;
use crate::config::NotificationConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use std::time::Duration;

/// Sends SMS through the Twilio Messages API
pub struct TwilioSms {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

impl TwilioSms {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        })
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        Self::new(
            &config.twilio_api_base,
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_phone_number,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::Notification(format!("SMS request to {} failed: {}", to, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "SMS to {} rejected with {}: {}",
                to, status, text
            ))
            .into());
        }

        let sid = resp
            .json::<MessageResource>()
            .await
            .ok()
            .and_then(|m| m.sid)
            .unwrap_or_else(|| "unknown".to_string());

        info!("SMS sent successfully to {} (SID: {})", to, sid);

        Ok(())
    }
}
