use crate::{model_service::ModelError, server::SharedState};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

pub const ANALYZER_ROUTE: &str = "/analyzer";

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub prediction: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("No image file provided")]
    MissingImage,
    #[error("Image file exceeds the {0} byte limit")]
    FileTooLarge(usize),
    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),
    #[error("{0}")]
    Model(#[from] ModelError),
}

impl AnalyzeError {
    fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::MissingImage => StatusCode::BAD_REQUEST,
            AnalyzeError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::Upload(e) => e.status(),
            AnalyzeError::Model(ModelError::Pipeline(e)) if e.is_invalid_input() => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AnalyzeError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Analysis failed: {}", self);
        } else {
            tracing::warn!("Rejected analysis request: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn analyze_ecg(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AnalyzeError> {
    state.metrics.record_request(ANALYZER_ROUTE);

    let multipart = multipart.map_err(|rejection| {
        tracing::debug!("Request is not a multipart upload: {}", rejection.body_text());
        AnalyzeError::MissingImage
    })?;

    let upload_config = &state.upload_config;
    let image_data = read_file_field(multipart, &upload_config.field_name)
        .await?
        .filter(|data| !data.is_empty())
        .ok_or(AnalyzeError::MissingImage)?;

    if image_data.len() > upload_config.max_file_bytes {
        return Err(AnalyzeError::FileTooLarge(upload_config.max_file_bytes));
    }

    tracing::debug!("Received ECG image of {} bytes", image_data.len());

    let start = Instant::now();
    let prediction = state.model_service.predict(image_data).await?;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    state.metrics.record_prediction_duration(elapsed_ms);
    state.metrics.record_prediction(&prediction.label);
    tracing::info!(
        class_id = prediction.class_id,
        label = %prediction.label,
        elapsed_ms,
        "ECG analyzed"
    );

    Ok(Json(AnalyzeResponse {
        prediction: prediction.label,
    }))
}

/// Returns the content of the first file part named `field_name`. Plain form
/// values with the same name are skipped.
async fn read_file_field(
    mut multipart: Multipart,
    field_name: &str,
) -> Result<Option<Vec<u8>>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(field_name) && field.file_name().is_some() {
            return Ok(Some(field.bytes().await?.to_vec()));
        }
    }
    Ok(None)
}
