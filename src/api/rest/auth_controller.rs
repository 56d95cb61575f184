use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::user_models::{ForgotPasswordRequest, LoginCredentials, RegisterRequest};
use crate::error::Error;
use crate::security::RegisterOutcome;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
    pub token: String,
}

/// Unreadable or mistyped bodies are validation errors like any other
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|e| {
        ApiError::from(Error::Validation(format!("Invalid request body: {}", e.body_text())))
    })
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let request = json_body(payload)?;
    match state.auth_service.register(&request).await? {
        RegisterOutcome::OtpSent => Ok(MessageResponse::new("OTP sent successfully.")),
        RegisterOutcome::Registered(_) => Ok(MessageResponse::new("User registered successfully.")),
    }
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginCredentials>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let credentials = json_body(payload)?;
    let (user, token) = state.auth_service.login(&credentials).await?;

    Ok(Json(LoginResponse {
        message: "Login successful.".to_string(),
        username: user.username,
        token: token.access_token,
    }))
}

async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let request = json_body(payload)?;
    state
        .auth_service
        .forgot_password(request.email.as_deref().unwrap_or_default())
        .await?;
    Ok(MessageResponse::new("Password recovery email sent."))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
}
