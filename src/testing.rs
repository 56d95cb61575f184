//! In-memory fakes and helpers shared by the unit tests

use crate::db::models::user_models::User;
use crate::db::repositories::users::UserStore;
use crate::detection::staging::StagedFile;
use crate::detection::{DetectionKind, DetectionResult, Detector};
use crate::error::Error;
use crate::notify::{EmailMessage, EmailSender, SmsSender};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Serve `app` on an ephemeral local port for the rest of the test
pub fn spawn_server(app: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

/// Detector returning a fixed result, with optional injected failures and latency
pub struct FakeDetector {
    kind: DetectionKind,
    result: DetectionResult,
    failures: u32,
    delay: Option<Duration>,
    calls: AtomicU32,
    seen: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeDetector {
    fn new(result: DetectionResult) -> Self {
        Self {
            kind: result.kind(),
            result,
            failures: 0,
            delay: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn animal(label: &str) -> Self {
        Self::new(DetectionResult::AnimalLabel(label.to_string()))
    }

    pub fn gun(confidence: f64) -> Self {
        Self::new(DetectionResult::GunScore(confidence))
    }

    pub fn gunshot(flag: bool) -> Self {
        Self::new(DetectionResult::GunshotFlag(flag))
    }

    /// Fail the first `n` calls
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failures = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// File name and contents of every staged file this detector was given
    pub fn seen_files(&self) -> Vec<(String, Vec<u8>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Detector for FakeDetector {
    fn kind(&self) -> DetectionKind {
        self.kind
    }

    async fn detect(&self, staged: &StagedFile) -> Result<DetectionResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = tokio::fs::read(&staged.path).await?;
        self.seen
            .lock()
            .unwrap()
            .push((staged.file_name.clone(), bytes));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call <= self.failures {
            return Err(anyhow!("injected failure on call {}", call));
        }

        Ok(self.result.clone())
    }
}

/// Email sender that records instead of sending
#[derive(Default)]
pub struct RecordingEmail {
    fail: bool,
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        if self.fail {
            return Err(Error::Notification("mail relay unreachable".to_string()).into());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// SMS sender that records instead of sending
#[derive(Default)]
pub struct RecordingSms {
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(to, body)` pairs
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Notification(format!("SMS gateway rejected {}", to)).into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// User store kept in a vector, in insertion order
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users),
        }
    }

    pub fn users(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list_recipient_emails(&self) -> Result<Vec<String>> {
        Ok(self.users().into_iter().map(|u| u.email).collect())
    }

    async fn list_recipient_phones(&self) -> Result<Vec<String>> {
        Ok(self.users().into_iter().map(|u| u.phone_number).collect())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users().into_iter().find(|u| u.email == email))
    }

    async fn get_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        Ok(self
            .users()
            .into_iter()
            .find(|u| u.phone_number == phone_number))
    }

    /// Enforces the same uniqueness as the `users` table
    async fn create(&self, user: &User) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(Error::AlreadyExists("Email already registered.".to_string()).into());
        }
        if users.iter().any(|u| u.phone_number == user.phone_number) {
            return Err(
                Error::AlreadyExists("Phone number already registered.".to_string()).into(),
            );
        }
        users.push(user.clone());
        Ok(user.clone())
    }

    async fn update(&self, user: &User) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        let existing = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", user.id)))?;
        *existing = user.clone();
        Ok(user.clone())
    }

    async fn update_last_login(&self, id: &Uuid) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == *id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }
}

/// A registered user with a throwaway password hash
pub fn user(username: &str, email: &str, phone_number: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        phone_number: phone_number.to_string(),
        dept_id: "forest-dept".to_string(),
        password_hash: String::new(),
        created_at: now,
        updated_at: now,
        last_login: None,
    }
}
