use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Request-level service error.
///
/// Per-image problems never surface here; they become failure records in the
/// response body. These are the errors that reject a whole request.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Service busy: {message}")]
    Unavailable {
        message: String,
        retry_after_secs: u64,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors fetching the source document.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unable to fetch PDF: HTTP {status}")]
    Status { status: u16 },

    #[error("Downloaded PDF is empty")]
    Empty,

    #[error("PDF exceeds max size ({size} > {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid PDF signature")]
    InvalidSignature,

    #[error("Fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Upstream statuses worth retrying later.
pub const RETRYABLE_STATUS_CODES: [u16; 8] = [408, 409, 425, 429, 500, 502, 503, 504];

impl FetchError {
    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status } => Some(*status),
            FetchError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Request(e) if e.is_timeout() || e.is_connect() => true,
            _ => self
                .status()
                .is_some_and(|s| RETRYABLE_STATUS_CODES.contains(&s)),
        }
    }
}

/// Why a batch's source document could not be made available. The display
/// form is the message every image of the batch is failed with.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(
        "stage=pdf_fetch elapsedMs={elapsed_ms} timeoutMs={timeout_ms} {source}{}",
        retry_hint(.source)
    )]
    Fetch {
        elapsed_ms: u128,
        timeout_ms: u128,
        source: FetchError,
    },

    #[error("stage=pdf_open elapsedMs={elapsed_ms} {source}")]
    Open { elapsed_ms: u128, source: RenderError },

    #[error("stage=pdf_open elapsedMs={elapsed_ms} timeoutMs={timeout_ms} Opening PDF timed out")]
    OpenTimeout { elapsed_ms: u128, timeout_ms: u128 },

    #[error("stage=pdf_open elapsedMs={elapsed_ms} Open task aborted: {message}")]
    OpenAborted { elapsed_ms: u128, message: String },
}

fn retry_hint(error: &FetchError) -> &'static str {
    if error.is_retryable() {
        " retryable=true"
    } else {
        ""
    }
}

/// Errors reported by a page renderer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to open PDF: {message}")]
    Open { message: String },

    /// The surface produced in the current render mode could not be used.
    /// This is the only error that triggers the print-mode retry.
    #[error("Image or Canvas expected: {message}")]
    IncompatibleSurface { message: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Render failed: {message}")]
    Failed { message: String },
}

/// Errors from raster canvas operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvasError {
    #[error("Cannot allocate {width}x{height} surface")]
    Allocation { width: u32, height: u32 },

    #[error("Region {region} does not fit in {width}x{height} surface")]
    OutOfBounds {
        region: String,
        width: u32,
        height: u32,
    },

    #[error("PNG encoding failed: {message}")]
    Encode { message: String },
}

/// API error response (matches Axum's built-in JsonRejection format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ServiceError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest {
            message: message.into(),
            details: None,
        }
    }

    /// Invalid request blamed on one field, named by its JSON path in
    /// `details.field`.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest {
            message: message.into(),
            details: Some(serde_json::json!({ "field": field.into() })),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Config { .. } | ServiceError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Unavailable { .. } => "service_unavailable",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let (details, retry_after_secs) = match &self {
            ServiceError::InvalidRequest { details, .. } => (details.clone(), None),
            ServiceError::Unavailable {
                retry_after_secs, ..
            } => (None, Some(*retry_after_secs)),
            _ => (None, None),
        };

        let body = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
            details,
            retry_after_secs,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
