//! Error types for Hearth
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse`. That conversion is the single
//! place where failures become user-visible responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::data::BackendError;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown path or missing record (404)
    #[error("{0}")]
    NotFound(String),

    /// Request input could not be parsed (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Route requires a feature that is switched off (403)
    #[error("{0}")]
    FeatureDisabled(String),

    /// Remote data backend failed (500)
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// View could not be rendered (500)
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration error (500, fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            AppError::Backend(_)
            | AppError::Render(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::FeatureDisabled(_) => "feature_disabled",
            AppError::Backend(_) => "backend",
            AppError::Render(_) => "render",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Client errors carry their message; server errors are logged
    /// and answered with a generic message.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status();
        let message = match &self {
            AppError::NotFound(msg) | AppError::Validation(msg) | AppError::FeatureDisabled(msg) => {
                msg.clone()
            }
            AppError::Backend(_) => "Backend error".to_string(),
            AppError::Render(_) => "Failed to render view".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "Internal server error".to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        let body = Json(serde_json::json!({
            "status": "error",
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
