//! Error types for map generation and artifact handling, and their HTTP
//! mapping.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{ErrorResponse, ValidationError};
use serde_json::json;

/// Why one generation job failed.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("map generator produced unreadable output: {0}")]
    MalformedOutput(String),
    #[error("map generator failed: {0}")]
    ProcessError(String),
    #[error("map generator {}", exit_label(.0))]
    ExitFailure(Option<i32>),
    #[error("failed to place generated map: {0}")]
    ArtifactPlacementFailed(#[from] StoreError),
    #[error("map generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedOutput(_) => "MALFORMED_OUTPUT",
            Self::ProcessError(_) => "PROCESS_ERROR",
            Self::ExitFailure(_) => "EXIT_FAILURE",
            Self::ArtifactPlacementFailed(_) => "ARTIFACT_PLACEMENT_FAILED",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// Artifact store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reported artifact path {} has no file name", .0.display())]
    NoFileName(PathBuf),
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to delete {failed} of {attempted} artifacts: {first}")]
    CleanupFailed {
        failed: usize,
        attempted: usize,
        first: String,
    },
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// HTTP error with a stable code, rendered as [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let missing: Vec<&str> = err.missing.iter().map(|f| f.as_str()).collect();
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: "Missing required parameters".to_string(),
            details: Some(json!({ "missing": missing })),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: err.code(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::CleanupFailed { .. } => "CLEANUP_FAILED",
            _ => "STORE_ERROR",
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: err.to_string(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: Some(self.code.to_string()),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}
