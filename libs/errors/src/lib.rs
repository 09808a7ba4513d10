//! Error handling shared by the openXDA export crates
//!
//! [`XdaError`] is the library-level error. Service errors keep their own
//! enums and implement [`XdaErrorTrait`], which derives the HTTP status and
//! log level from an [`ErrorCategory`] and renders the JSON error envelope.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Body of a failed JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP status
    pub code: u16,
    pub message: String,
    /// Machine readable error code, e.g. `EXPORT_NOT_FOUND`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, Vec<String>>,
}

impl ErrorInfo {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            field_errors: HashMap::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_field_error(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(error.into());
        self
    }
}

/// `{"success": false, "error": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

impl From<ErrorInfo> for ErrorResponse {
    fn from(error: ErrorInfo) -> Self {
        Self {
            success: false,
            error,
        }
    }
}

/// How an error is classified for status codes and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Database,
    Validation,
    NotFound,
    Permission,
    /// Waveform math failed
    Calculation,
    /// Stored data could not be decoded
    DataCorruption,
    /// Client went away mid-export
    Cancelled,
    Internal,
    Unknown,
}

impl ErrorCategory {
    pub fn status_code(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Permission => 403,
            Self::NotFound => 404,
            // nginx's "client closed request"
            Self::Cancelled => 499,
            _ => 500,
        }
    }

    pub fn log_level(self) -> tracing::Level {
        match self {
            Self::Validation | Self::NotFound | Self::Cancelled => tracing::Level::INFO,
            Self::Configuration | Self::Permission | Self::Unknown => tracing::Level::WARN,
            Self::Database | Self::Calculation | Self::DataCorruption | Self::Internal => {
                tracing::Level::ERROR
            },
        }
    }
}

/// Library-level error, raised while loading configuration and starting up
#[derive(Debug, Error)]
pub enum XdaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Database not found at {path}")]
    DatabaseNotFound { path: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Service startup failed: {0}")]
    StartupFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type XdaResult<T> = Result<T, XdaError>;

impl XdaError {
    pub fn status_code(&self) -> u16 {
        self.category().status_code()
    }
}

impl XdaErrorTrait for XdaError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::DatabaseNotFound { .. } => "DATABASE_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::StartupFailed(_) => "STARTUP_FAILED",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } | Self::DatabaseNotFound { .. } => {
                ErrorCategory::Configuration
            },
            Self::Database(_) => ErrorCategory::Database,
            Self::StartupFailed(_) => ErrorCategory::Internal,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Outward face of a crate's error type
pub trait XdaErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Stable code for API bodies and logs
    fn error_code(&self) -> &'static str;

    fn category(&self) -> ErrorCategory;

    fn log_level(&self) -> tracing::Level {
        self.category().log_level()
    }

    #[cfg(feature = "axum-support")]
    fn http_status(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::from_u16(self.category().status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// JSON error envelope with `details` set to [`error_code`](Self::error_code)
    #[cfg(feature = "axum-support")]
    fn into_http_response(self) -> axum::response::Response
    where
        Self: Sized,
    {
        use axum::response::IntoResponse;

        let status = self.http_status();
        let info = ErrorInfo::new(status.as_u16(), self.to_string()).with_details(self.error_code());
        (status, axum::Json(ErrorResponse::from(info))).into_response()
    }
}
