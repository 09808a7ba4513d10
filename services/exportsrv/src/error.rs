use axum::response::{IntoResponse, Response};
use axum::Json;
use errors::{ErrorCategory, ErrorInfo, ErrorResponse, XdaErrorTrait};
use thiserror::Error;
use xda_model::ModelError;

/// Result type for exportsrv
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors raised while handling an export or record request
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid parameter {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Model error: {0}")]
    Model(ModelError),

    #[error("CSV write error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export cancelled: client disconnected")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExportError {
    pub fn invalid_parameter(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

impl From<ModelError> for ExportError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotFound(what) => ExportError::NotFound(what),
            other => ExportError::Model(other),
        }
    }
}

impl From<sqlx::Error> for ExportError {
    fn from(err: sqlx::Error) -> Self {
        ExportError::Database(err.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            if let csv::ErrorKind::Io(io) = err.into_kind() {
                return ExportError::Io(io);
            }
            return ExportError::Csv("io".to_string());
        }
        ExportError::Csv(err.to_string())
    }
}

impl XdaErrorTrait for ExportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "EXPORT_INVALID_PARAMETER",
            Self::NotFound(_) => "EXPORT_NOT_FOUND",
            Self::Forbidden(_) => "EXPORT_FORBIDDEN",
            Self::Database(_) => "EXPORT_DATABASE_ERROR",
            Self::Model(ModelError::Decode(_)) => "EXPORT_DECODE_ERROR",
            Self::Model(ModelError::Serialization(_)) => "EXPORT_PARSE_ERROR",
            Self::Model(ModelError::Validation(_)) => "EXPORT_VALIDATION_ERROR",
            Self::Model(_) => "EXPORT_MODEL_ERROR",
            Self::Csv(_) => "EXPORT_CSV_ERROR",
            Self::Io(_) => "EXPORT_IO_ERROR",
            Self::Cancelled => "EXPORT_CANCELLED",
            Self::Config(_) => "EXPORT_CONFIG_ERROR",
            Self::Internal(_) => "EXPORT_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParameter { .. } => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Forbidden(_) => ErrorCategory::Permission,
            Self::Database(_) => ErrorCategory::Database,
            Self::Model(ModelError::Decode(_)) | Self::Model(ModelError::Serialization(_)) => {
                ErrorCategory::DataCorruption
            },
            Self::Model(ModelError::Validation(_)) => ErrorCategory::Validation,
            Self::Model(ModelError::Database(_)) => ErrorCategory::Database,
            Self::Model(_) => ErrorCategory::Calculation,
            Self::Csv(_) | Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Config(_) => ErrorCategory::Configuration,
        }
    }
}

/// Parameter errors also name the offending field in `field_errors`
impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let Self::InvalidParameter { param, reason } = &self else {
            return self.into_http_response();
        };
        let status = self.http_status();
        let info = ErrorInfo::new(status.as_u16(), self.to_string())
            .with_details(self.error_code())
            .with_field_error(param, reason);
        (status, Json(ErrorResponse::from(info))).into_response()
    }
}
