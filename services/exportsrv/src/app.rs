//! Application state and initialization

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::sqlite::{SqliteClient, SqlitePool};
use errors::{XdaError, XdaResult};
use tracing::info;

use crate::config::ExportsrvConfig;
use crate::exception_logger::{ExceptionLogger, TracingExceptionLogger};

/// Application state shared across all handlers
pub struct AppState {
    pub config: Arc<ExportsrvConfig>,
    pub sqlite: Arc<SqliteClient>,
    pub exception_logger: Arc<dyn ExceptionLogger>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ExportsrvConfig, sqlite: SqliteClient) -> Self {
        Self::with_exception_logger(config, sqlite, Arc::new(TracingExceptionLogger))
    }

    pub fn with_exception_logger(
        config: ExportsrvConfig,
        sqlite: SqliteClient,
        exception_logger: Arc<dyn ExceptionLogger>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sqlite: Arc::new(sqlite),
            exception_logger,
            started_at: Utc::now(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.sqlite.pool()
    }
}

/// Open the configured database and build the shared state
pub async fn create_app_state(config: ExportsrvConfig) -> XdaResult<Arc<AppState>> {
    let db_path = config.database.path.clone();
    if !std::path::Path::new(&db_path).exists() {
        return Err(XdaError::DatabaseNotFound { path: db_path });
    }

    let sqlite = SqliteClient::new(&db_path)
        .await
        .map_err(|e| XdaError::Database(format!("Failed to open {}: {}", db_path, e)))?;
    sqlite
        .ping()
        .await
        .map_err(|e| XdaError::Database(format!("Database {} not reachable: {}", db_path, e)))?;

    info!("Using openXDA database at {}", db_path);
    Ok(Arc::new(AppState::new(config, sqlite)))
}
