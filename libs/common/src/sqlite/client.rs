use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    fn options(self, path: &str) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .busy_timeout(BUSY_TIMEOUT);
        match self {
            OpenMode::ReadWrite => options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true),
            OpenMode::ReadOnly => options.read_only(true),
        }
    }

    fn max_connections(self) -> u32 {
        match self {
            OpenMode::ReadWrite => 10,
            OpenMode::ReadOnly => 5,
        }
    }
}

/// Shared handle to the openXDA SQLite database
#[derive(Clone)]
pub struct SqliteClient {
    pool: Arc<SqlitePool>,
    db_path: String,
}

impl SqliteClient {
    /// Open read-write, creating the file and its directory if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::connect(db_path.as_ref(), OpenMode::ReadWrite).await
    }

    /// Open an existing database read-only
    pub async fn new_readonly(db_path: impl AsRef<Path>) -> Result<Self> {
        if !db_path.as_ref().exists() {
            bail!("Database file not found: {}", db_path.as_ref().display());
        }
        Self::connect(db_path.as_ref(), OpenMode::ReadOnly).await
    }

    async fn connect(path: &Path, mode: OpenMode) -> Result<Self> {
        let db_path = path.to_string_lossy().to_string();
        let pool = SqlitePoolOptions::new()
            .max_connections(mode.max_connections())
            .connect_with(mode.options(&db_path))
            .await?;

        if mode == OpenMode::ReadWrite {
            // waveform blobs are large; 8MB page cache
            sqlx::query("PRAGMA cache_size = -8000").execute(&pool).await?;
        }

        info!("SQLite database opened ({:?}): {}", mode, db_path);
        Ok(Self {
            pool: Arc::new(pool),
            db_path,
        })
    }

    /// Wrap a pool opened elsewhere (tests)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
            db_path: ":pool:".to_string(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}
