use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("XML generation failed: {reason}")]
    Render { reason: String },

    #[error("Document signing failed: {reason}")]
    Signing { reason: String },

    #[error("Authority submission failed: {reason}")]
    Submission {
        status_code: Option<u16>,
        reason: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable tag for each error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::BadRequest(_) => "bad_request",
            AppError::Duplicate(_) => "duplicate",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Render { .. } => "render_error",
            AppError::Signing { .. } => "signing_error",
            AppError::Submission { .. } => "submission_error",
            AppError::Persistence(_) => "persistence_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Render { .. }
            | AppError::Signing { .. }
            | AppError::Submission { .. }
            | AppError::Persistence(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            kind: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let status = self.status();
        let kind = self.kind();

        let (error_message, details) = match &self {
            AppError::Submission {
                status_code: Some(code),
                reason,
            } => (reason.clone(), Some(format!("authority returned {code}"))),
            AppError::Persistence(err) => ("Persistence error".to_string(), Some(err.to_string())),
            AppError::Config(err) => ("Configuration error".to_string(), Some(err.to_string())),
            AppError::Internal(err) => ("Internal server error".to_string(), Some(err.to_string())),
            other => (other.to_string(), None),
        };

        if status.is_server_error() {
            tracing::error!(kind, error = %error_message, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                kind,
                details,
            }),
        )
            .into_response()
    }
}
