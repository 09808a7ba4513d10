//! Exception reporting for failed exports
//!
//! Handlers never swallow an error silently: before an error becomes a
//! response (or aborts a stream) it is handed to the state's logger.

use errors::XdaErrorTrait;
use tracing::error;

use crate::error::ExportError;

pub trait ExceptionLogger: Send + Sync {
    fn log_exception(&self, err: &ExportError);
}

/// Default logger, writes every exception through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExceptionLogger;

impl ExceptionLogger for TracingExceptionLogger {
    fn log_exception(&self, err: &ExportError) {
        error!(
            error_code = err.error_code(),
            category = ?err.category(),
            "Export failed: {}",
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logs_error_code() {
        TracingExceptionLogger.log_exception(&ExportError::Database("locked".into()));
        assert!(logs_contain("EXPORT_DATABASE_ERROR"));
        assert!(logs_contain("locked"));
    }
}
