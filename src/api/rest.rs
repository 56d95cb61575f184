use crate::config::ApiConfig;
use crate::error::Error;
use crate::security::AuthService;
use crate::services::SubmissionPipeline;
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub mod auth_controller;
pub mod upload_controller;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub auth_service: Arc<AuthService>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// JSON error body: `{"error": "...", "status": 400}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    pub status: u16,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            Error::Authentication(message) => ApiError::new(StatusCode::UNAUTHORIZED, message),
            Error::NotFound(message) => ApiError::new(StatusCode::NOT_FOUND, message),
            Error::AlreadyExists(message) => ApiError::new(StatusCode::CONFLICT, message),
            _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return err.clone().into();
        }

        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, self.message);
        } else if status.is_client_error() {
            info!("Request rejected with {}: {}", status, self.message);
        }
        (status, Json(self)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// CORS for the configured origins, or any origin when none are configured.
/// The layer answers every OPTIONS request with an empty 200.
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}

/// Every route the service exposes
pub fn router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .merge(upload_controller::create_router())
        .merge(auth_controller::create_router())
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(config))
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            config: config.clone(),
            state,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let app = router(self.state.clone(), &self.config);

        let addr: SocketAddr = format!("{}:{}", self.config.address, self.config.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid API address: {}", e)))?;

        info!("API server listening on {}", addr);

        axum::Server::try_bind(&addr)
            .map_err(|e| Error::Io(format!("Failed to bind {}: {}", addr, e)))?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertDispatcher, ZoneTable};
    use crate::config::{Config, SecurityConfig};
    use crate::detection::retry::RetryPolicy;
    use crate::detection::staging::StagingArea;
    use crate::detection::{DetectionOrchestrator, DetectorSet};
    use crate::events::EventStore;
    use crate::messaging::{EventBus, EventType};
    use crate::testing::{spawn_server, FakeDetector, MemoryUserStore, RecordingEmail, RecordingSms};
    use reqwest::multipart::{Form, Part};
    use serde_json::Value;

    struct Harness {
        _tmp: tempfile::TempDir,
        base: String,
        events: Arc<EventStore>,
        sms: Arc<RecordingSms>,
        bus: Arc<EventBus>,
        client: reqwest::Client,
    }

    fn harness(animal: FakeDetector) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let users = Arc::new(MemoryUserStore::new());
        let email = Arc::new(RecordingEmail::new());
        let sms = Arc::new(RecordingSms::new());

        let orchestrator = DetectionOrchestrator::new(
            StagingArea::new(tmp.path().join("staging")),
            DetectorSet {
                animal: Arc::new(animal),
                gun: Arc::new(FakeDetector::gun(0.73)),
                gunshot: Arc::new(FakeDetector::gunshot(false)),
            },
            RetryPolicy::immediate(3),
            Duration::from_millis(500),
            0.5,
            bus.clone(),
        );
        let events = Arc::new(EventStore::new(tmp.path().join("results.csv")));
        let alerts = AlertDispatcher::new(
            Arc::new(ZoneTable::from_config(&Config::default().zones)),
            users.clone(),
            email.clone(),
            sms.clone(),
            "alerts@wildwatch.org",
            bus.clone(),
        );
        let security = SecurityConfig {
            password_hash_cost: 4,
            ..SecurityConfig::default()
        };
        let state = AppState {
            pipeline: Arc::new(SubmissionPipeline::new(
                Arc::new(orchestrator),
                events.clone(),
                Arc::new(alerts),
                bus.clone(),
            )),
            auth_service: Arc::new(AuthService::new(
                users,
                email,
                sms.clone(),
                "alerts@wildwatch.org",
                &security,
            )),
        };

        let addr = spawn_server(router(state, &ApiConfig::default()));
        Harness {
            _tmp: tmp,
            base: format!("http://{}", addr),
            events,
            sms,
            bus,
            client: reqwest::Client::new(),
        }
    }

    fn image() -> Part {
        Part::bytes(vec![1u8, 2, 3]).file_name("frame.jpg")
    }

    fn audio() -> Part {
        Part::bytes(vec![4u8, 5, 6]).file_name("clip.wav")
    }

    async fn post_upload(h: &Harness, form: Form) -> (StatusCode, Value) {
        let resp = h
            .client
            .post(format!("{}/upload", h.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_upload_returns_fused_result() {
        let h = harness(FakeDetector::animal("Elephant"));
        let form = Form::new()
            .text("type", "gun")
            .text("source", "2")
            .part("image", image())
            .part("audio", audio());

        let (status, body) = post_upload(&h, form).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["animal"], "No");
        assert_eq!(body["gunshot"], "Yes");
        assert_eq!(body["datasource"], "2");
        assert!(body["week"].as_u64().unwrap() <= 4);
        assert_eq!(body["date"].as_str().unwrap().len(), 10);
        assert_eq!(body["time"].as_str().unwrap().len(), 5);

        let records = h.events.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].datasource, "datasource2");
    }

    #[tokio::test]
    async fn test_upload_validation_errors_are_400() {
        let h = harness(FakeDetector::animal("Elephant"));

        let form = Form::new().text("type", "bird").text("source", "1").part("image", image());
        let (status, body) = post_upload(&h, form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid type or missing datasource");
        assert_eq!(body["status"], 400);

        let form = Form::new().text("type", "gun").text("source", "1").part("image", image());
        let (status, body) = post_upload(&h, form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing image or audio file");

        assert!(h.events.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_uploads_are_published() {
        let h = harness(FakeDetector::animal("Elephant"));
        let mut events = h.bus.receiver();

        let form = Form::new().text("type", "gun").text("source", "1").part("image", image());
        let (status, _) = post_upload(&h, form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let form = Form::new().text("type", "bird").text("source", "1").part("image", image());
        let (status, _) = post_upload(&h, form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let kinds: Vec<EventType> = seen.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::SubmissionReceived,
                EventType::SubmissionRejected,
                EventType::SubmissionRejected,
            ]
        );
        assert_eq!(seen[1].payload["reason"], "Validation error: Missing image or audio file");
        assert_eq!(seen[1].source_id, seen[0].source_id);
        assert_eq!(
            seen[2].payload["reason"],
            "Validation error: Invalid type or missing datasource"
        );
        assert!(seen[2].source_id.is_none());
    }

    #[tokio::test]
    async fn test_malformed_auth_bodies_get_json_errors() {
        let h = harness(FakeDetector::animal("Elephant"));
        let post_raw = |path: &str, body: &'static str| {
            h.client
                .post(format!("{}{}", h.base, path))
                .header("content-type", "application/json")
                .body(body)
                .send()
        };

        for path in ["/register", "/login", "/forgot-password"] {
            let resp = post_raw(path, "{not json").await.unwrap();
            assert_eq!(resp.status().as_u16(), 400, "{}", path);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["status"], 400, "{}", path);
            assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
        }

        let resp = post_raw(
            "/register",
            r#"{"email":"asha@example.com","phone":"+911234567890","username":"asha","password":"pw","deptId":7}"#,
        )
        .await
        .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("deptId"));

        let resp = post_raw("/login", r#"{"email":"asha@example.com"}"#).await.unwrap();
        assert_eq!(resp.status().as_u16(), 401);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Invalid credentials.", "status": 401}));

        let resp = post_raw("/forgot-password", "{}").await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_upload_detection_failure_is_500() {
        let h = harness(FakeDetector::animal("Elephant").failing_first(u32::MAX));
        let form = Form::new()
            .text("type", "animal")
            .text("source", "1")
            .part("image", image());

        let (status, body) = post_upload(&h, form).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Detection failed after 3 attempts"));
    }

    #[tokio::test]
    async fn test_options_is_empty_200_with_cors_headers() {
        let h = harness(FakeDetector::animal("Elephant"));
        for path in ["/upload", "/register", "/login", "/forgot-password"] {
            let resp = h
                .client
                .request(reqwest::Method::OPTIONS, format!("{}{}", h.base, path))
                .header("Origin", "https://wild-watch.netlify.app")
                .header("Access-Control-Request-Method", "POST")
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status().as_u16(), 200, "{}", path);
            assert_eq!(
                resp.headers()
                    .get("access-control-allow-origin")
                    .and_then(|v| v.to_str().ok()),
                Some("https://wild-watch.netlify.app")
            );
            assert!(resp.bytes().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_origin_gets_no_cors_grant() {
        let h = harness(FakeDetector::animal("Elephant"));
        let resp = h
            .client
            .request(reqwest::Method::OPTIONS, format!("{}/upload", h.base))
            .header("Origin", "https://evil.example")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(FakeDetector::animal("Elephant"));
        let body: Value = h
            .client
            .get(format!("{}/health", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_login_flow_over_http() {
        let h = harness(FakeDetector::animal("Elephant"));
        let mut registration = json!({
            "email": "asha@example.com",
            "phone": "+911234567890",
            "username": "asha",
            "password": "s3cret-pass",
            "deptId": "forest-dept",
        });

        let resp = h
            .client
            .post(format!("{}/register", h.base))
            .json(&registration)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"message": "OTP sent successfully."}));

        let (_, sms_body) = h.sms.sent().pop().unwrap();
        let code: String = sms_body.chars().filter(|c| c.is_ascii_digit()).collect();
        registration["otp"] = json!(code);

        let body: Value = h
            .client
            .post(format!("{}/register", h.base))
            .json(&registration)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["message"], "User registered successfully.");

        let resp = h
            .client
            .post(format!("{}/register", h.base))
            .json(&registration)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 409);

        let body: Value = h
            .client
            .post(format!("{}/login", h.base))
            .json(&json!({"email": "asha@example.com", "password": "s3cret-pass"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["message"], "Login successful.");
        assert_eq!(body["username"], "asha");
        assert!(!body["token"].as_str().unwrap().is_empty());

        let resp = h
            .client
            .post(format!("{}/login", h.base))
            .json(&json!({"email": "asha@example.com", "password": "nope"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 401);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Invalid credentials.");

        let resp = h
            .client
            .post(format!("{}/forgot-password", h.base))
            .json(&json!({"email": "ghost@example.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |err: Error| ApiError::from(anyhow::Error::from(err)).status;
        assert_eq!(status(Error::Validation("x".into())), 400);
        assert_eq!(status(Error::Authentication("x".into())), 401);
        assert_eq!(status(Error::NotFound("x".into())), 404);
        assert_eq!(status(Error::AlreadyExists("x".into())), 409);
        assert_eq!(
            status(Error::DetectionFailure {
                attempts: 3,
                cause: "down".into()
            }),
            500
        );
        assert_eq!(status(Error::Io("disk full".into())), 500);
        assert_eq!(ApiError::from(anyhow::anyhow!("opaque")).status, 500);
    }
}
