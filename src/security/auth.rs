use crate::config::SecurityConfig;
use crate::db::models::user_models::{AuthToken, LoginCredentials, RegisterRequest, User};
use crate::db::repositories::users::UserStore;
use crate::error::Error;
use crate::notify::{EmailMessage, EmailSender, SmsSender};
use crate::security::otp::OtpStore;
use crate::security::{password, SecurityService};
use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("valid email regex"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid phone regex"));

const TEMP_PASSWORD_LENGTH: usize = 12;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Result of a registration step
#[derive(Debug)]
pub enum RegisterOutcome {
    /// A code was issued and sent; the client must resubmit with it
    OtpSent,
    Registered(User),
}

/// Registration, login and password recovery
pub struct AuthService {
    users: Arc<dyn UserStore>,
    security: SecurityService,
    otps: OtpStore,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    sender_email: String,
    config: SecurityConfig,
}

/// Registration fields after presence checks
struct Registration<'a> {
    email: &'a str,
    phone: &'a str,
    username: &'a str,
    password: &'a str,
    dept_id: &'a str,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        sender_email: impl Into<String>,
        config: &SecurityConfig,
    ) -> Self {
        Self {
            users,
            security: SecurityService::new(config.clone()),
            otps: OtpStore::new(Duration::from_secs(config.otp_ttl_secs)),
            email,
            sms,
            sender_email: sender_email.into(),
            config: config.clone(),
        }
    }

    pub fn security(&self) -> &SecurityService {
        &self.security
    }

    /// Two-step signup: the first call sends a code, the second (with `otp`) creates the user
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterOutcome> {
        let form = Self::required_fields(request)?;

        if !is_valid_email(form.email) || !is_valid_phone(form.phone) {
            return Err(
                Error::Validation("Invalid email or phone number format.".to_string()).into(),
            );
        }

        if self.users.get_by_email(form.email).await?.is_some() {
            return Err(Error::AlreadyExists("Email already registered.".to_string()).into());
        }

        if self.users.get_by_phone(form.phone).await?.is_some() {
            return Err(
                Error::AlreadyExists("Phone number already registered.".to_string()).into(),
            );
        }

        let otp = match request.otp.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(otp) => otp,
            None => {
                let code = self.otps.issue(form.email);
                self.send_otp(form.email, form.phone, &code).await;
                info!("OTP issued for {}", form.email);
                return Ok(RegisterOutcome::OtpSent);
            }
        };

        if !self.otps.verify(form.email, otp) {
            return Err(Error::Validation("Invalid OTP.".to_string()).into());
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: form.username.to_string(),
            email: form.email.to_string(),
            phone_number: form.phone.to_string(),
            dept_id: form.dept_id.to_string(),
            password_hash: password::hash_password(form.password, &self.config)?,
            created_at: now,
            updated_at: now,
            last_login: None,
        };

        let created = self.users.create(&user).await?;
        info!("New user registered: {}", created.username);

        Ok(RegisterOutcome::Registered(created))
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(User, AuthToken)> {
        let invalid = || Error::Authentication("Invalid credentials.".to_string());

        let email = credentials
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(invalid)?;
        let candidate = credentials.password.as_deref().ok_or_else(invalid)?;

        let user = self.users.get_by_email(email).await?.ok_or_else(invalid)?;

        if !password::verify_password(candidate, &user.password_hash)? {
            return Err(invalid().into());
        }

        self.users.update_last_login(&user.id).await?;
        let token = self.security.generate_token(&user)?;

        info!("User logged in: {}", user.username);

        Ok((user, token))
    }

    /// Email the user a temporary password, then make it their password.
    /// The stored hash only changes once the email has gone out.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::Validation("Email is required.".to_string()).into());
        }

        let user = self
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| Error::NotFound("Email not found.".to_string()))?;

        let temporary = password::generate_random_password(TEMP_PASSWORD_LENGTH);
        let mut updated = user.clone();
        updated.password_hash = password::hash_password(&temporary, &self.config)?;
        updated.updated_at = Utc::now();

        let body = format!(
            "Dear {},\n\
             \n\
             You requested to recover your account details.\n\
             \n\
             📧 Email: {}\n\
             📱 Phone: {}\n\
             🔑 Temporary password: {}\n\
             \n\
             Please log in and change this password.\n\
             \n\
             Regards,\n\
             Team WildWatch\n",
            user.username, user.email, user.phone_number, temporary
        );
        let message = EmailMessage::new(
            &self.sender_email,
            user.email.clone(),
            "Your Account Details - WildWatch",
            body,
        );
        self.email.send_email(&message).await.map_err(|e| {
            warn!("Password recovery email to {} failed: {:#}", user.email, e);
            e
        })?;

        self.users.update(&updated).await?;
        info!("Password recovery email sent to {}", user.email);

        Ok(())
    }

    fn required_fields(request: &RegisterRequest) -> Result<Registration<'_>> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }

        match (
            present(&request.email),
            present(&request.phone),
            present(&request.username),
            present(&request.password),
            present(&request.dept_id),
        ) {
            (Some(email), Some(phone), Some(username), Some(_), Some(dept_id)) => Ok(Registration {
                email,
                phone,
                username,
                password: request.password.as_deref().unwrap_or_default(),
                dept_id,
            }),
            _ => Err(Error::Validation("All fields are required.".to_string()).into()),
        }
    }

    /// OTP delivery is best effort per channel
    async fn send_otp(&self, email: &str, phone: &str, code: &str) {
        let message = EmailMessage::new(
            &self.sender_email,
            email,
            "Your One-Time Password (OTP) for WildWatch",
            format!(
                "Dear User,\n\
                 \n\
                 Your One-Time Password (OTP) for accessing Wildlife Monitoring Analysis and Conservation System is: {}\n\
                 \n\
                 Please use this OTP to proceed with your registration.\n\
                 Do not share this OTP with anyone for security reasons.\n\
                 \n\
                 Regards,\n\
                 Team WildWatch\n",
                code
            ),
        );
        let sms_body = format!("Your WildWatch OTP: {}. Do not share this with anyone.", code);

        let (email_result, sms_result) = tokio::join!(
            self.email.send_email(&message),
            self.sms.send_sms(phone, &sms_body)
        );
        if let Err(e) = email_result {
            warn!("Failed to email OTP to {}: {:#}", email, e);
        }
        if let Err(e) = sms_result {
            warn!("Failed to text OTP to {}: {:#}", phone, e);
        }
    }
}
