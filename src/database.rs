//! # Database Connection
//!
//! PostgreSQL pool construction and schema migration.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::{ClientError, ClientResult};

/// Build a connection pool from configuration.
pub async fn connect_pool(config: &DatabaseConfig) -> ClientResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&config.url)
        .await
        .map_err(|e| ClientError::Configuration(format!("database connection failed: {e}")))?;

    info!(max_connections = config.max_connections, "Database pool ready");
    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn migrate(pool: &PgPool) -> ClientResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ClientError::Configuration(format!("migration failed: {e}")))?;

    info!("Database migrations applied");
    Ok(())
}
