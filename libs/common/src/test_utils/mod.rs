//! Test fixtures shared by the export crates
//!
//! Enabled with the `test-utils` feature.

pub mod schema;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// In-memory database with the full openXDA schema
///
/// Each SQLite in-memory connection is its own database, so the pool is
/// capped at one connection.
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    schema::init_xda_schema(&pool).await?;
    Ok(pool)
}
