use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::detection::{FusedResult, Payload, SensorSubmission};
use crate::error::Error;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Fused verdict as returned to the sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub date: String,
    pub time: String,
    pub datasource: String,
    pub animal: String,
    pub gunshot: String,
    pub week: u32,
}

impl DetectionResponse {
    /// `datasource` echoes the value the client sent
    pub fn new(fused: &FusedResult, datasource: &str) -> Self {
        Self {
            date: fused.date(),
            time: fused.time(),
            datasource: datasource.to_string(),
            animal: fused.animal.clone(),
            gunshot: fused.gunshot_label().to_string(),
            week: fused.week(),
        }
    }
}

#[derive(Default)]
struct UploadForm {
    submission_type: Option<String>,
    source: Option<String>,
    image: Option<Payload>,
    audio: Option<Payload>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, Error> {
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        Error::Validation(format!("Malformed upload: {}", e))
    };
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        match name.as_str() {
            "type" => form.submission_type = Some(field.text().await.map_err(bad_form)?),
            "source" => form.source = Some(field.text().await.map_err(bad_form)?),
            "image" | "audio" => {
                let bytes = field.bytes().await.map_err(bad_form)?;
                let payload = Payload::new(file_name, bytes.to_vec());
                if name == "image" {
                    form.image = Some(payload);
                } else {
                    form.audio = Some(payload);
                }
            }
            other => debug!("Ignoring upload field {}", other),
        }
    }

    Ok(form)
}

/// `POST /upload`: multipart `type`, `source`, `image`, `audio`
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DetectionResponse>> {
    let multipart = multipart.map_err(|e| {
        ApiError::from(Error::Validation(format!("Expected multipart form data: {}", e)))
    })?;
    let form = read_form(multipart).await?;

    let submission = match SensorSubmission::from_form(
        form.submission_type.as_deref(),
        form.source.as_deref(),
        form.image,
        form.audio,
    ) {
        Ok(submission) => submission,
        Err(err) => {
            state.pipeline.reject(&err).await;
            return Err(err.into());
        }
    };
    info!(
        "Received {} submission {} from {}",
        submission.submission_type,
        submission.id,
        form.source.as_deref().unwrap_or_default()
    );

    let fused = state.pipeline.submit(submission).await?;

    Ok(Json(DetectionResponse::new(
        &fused,
        form.source.as_deref().map(str::trim).unwrap_or_default(),
    )))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}
