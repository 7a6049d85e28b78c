//! Batch extraction endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::AbortHandle;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};
use crate::extraction::{
    ExtractionRequest, ExtractionResponse, ExtractionResult, FailureCode, PNG_MIME_TYPE,
};

use super::AppState;

/// Header carrying the shared secret
pub const SECRET_HEADER: &str = "x-image-processor-secret";

/// Response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResponseDto {
    pub request_id: String,
    pub results: Vec<ExtractionResultDto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// One result; fields that do not apply are `null`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResultDto {
    pub image_id: String,
    pub status: ResultStatus,
    pub mime_type: Option<&'static str>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_base64: Option<String>,
    pub error_code: Option<FailureCode>,
    pub error_message: Option<String>,
}

impl From<ExtractionResult> for ExtractionResultDto {
    fn from(result: ExtractionResult) -> Self {
        match result {
            ExtractionResult::Success { image_id, crop } => Self {
                image_id,
                status: ResultStatus::Success,
                mime_type: Some(PNG_MIME_TYPE),
                width: Some(crop.width),
                height: Some(crop.height),
                bytes_base64: Some(STANDARD.encode(&crop.bytes)),
                error_code: None,
                error_message: None,
            },
            ExtractionResult::Failed {
                image_id,
                code,
                message,
            } => Self {
                image_id,
                status: ResultStatus::Failed,
                mime_type: None,
                width: None,
                height: None,
                bytes_base64: None,
                error_code: Some(code),
                error_message: Some(message),
            },
        }
    }
}

impl From<ExtractionResponse> for ExtractionResponseDto {
    fn from(response: ExtractionResponse) -> Self {
        Self {
            request_id: response.request_id,
            results: response.results.into_iter().map(Into::into).collect(),
        }
    }
}

fn authorize(headers: &HeaderMap, secret: &str) -> ServiceResult<()> {
    match headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        Some(provided) if provided == secret => Ok(()),
        _ => Err(ServiceError::Unauthorized),
    }
}

/// Wait for a batch slot, at most the configured queue timeout.
async fn acquire_permit(state: &AppState) -> ServiceResult<OwnedSemaphorePermit> {
    let queue_timeout = state.config.timing.queue_timeout();
    match tokio::time::timeout(queue_timeout, Arc::clone(&state.permits).acquire_owned()).await {
        Ok(Ok(permit)) => Ok(permit),
        Ok(Err(_)) => Err(ServiceError::internal("Batch limiter is closed")),
        Err(_) => Err(ServiceError::Unavailable {
            message: format!(
                "{} extraction batches already running",
                state.config.limits.max_concurrent_requests
            ),
            retry_after_secs: queue_timeout.as_secs().max(1),
        }),
    }
}

/// Aborts the batch task if the handler is dropped first.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Extract every requested region from the source PDF
pub async fn extract_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ExtractionRequest>, JsonRejection>,
) -> Result<Json<ExtractionResponseDto>, ServiceError> {
    authorize(&headers, &state.config.auth.secret)?;

    let Json(request) =
        payload.map_err(|rejection| ServiceError::invalid_request(rejection.body_text()))?;
    request.validate(state.config.limits.max_images_per_request)?;

    let permit = acquire_permit(&state).await.inspect_err(|_| {
        warn!(request_id = %request.request_id, "No batch slot available");
    })?;

    let orchestrator = Arc::clone(&state.orchestrator);
    let config = Arc::clone(&state.config);
    let task = tokio::spawn(async move {
        let _permit = permit;
        orchestrator.process(&request, &config).await
    });
    let _abort = AbortOnDrop(task.abort_handle());

    let response = task
        .await
        .map_err(|e| ServiceError::internal(format!("Extraction task failed: {}", e)))??;

    Ok(Json(response.into()))
}
