//! Status-store access for the modelforge worker.
//!
//! - [`models`]: row types and their conversion into core entities.
//! - [`repositories`]: SQL for the `project` and `telegram_user` tables.
//! - [`store`]: the [`ProjectStore`] seam the pipeline depends on.

use sqlx::postgres::PgPoolOptions;

use modelforge_core::config;
use modelforge_core::error::ConfigError;

pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::DbError;
pub use store::{PgProjectStore, ProjectStore};

pub type DbPool = sqlx::PgPool;

/// Default pool size. The worker runs one job at a time, so a handful of
/// connections is plenty.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database connection settings.
#[derive(Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Apply the bundled migrations at startup (local development only).
    pub run_migrations: bool,
}

// The URL usually embeds a password.
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

impl DbConfig {
    /// | Variable             | Required | Default |
    /// |----------------------|----------|---------|
    /// | `DATABASE_URL`       | yes      | --      |
    /// | `DB_MAX_CONNECTIONS` | no       | `5`     |
    /// | `DB_RUN_MIGRATIONS`  | no       | `false` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: config::required("DATABASE_URL")?,
            max_connections: config::parse_or("DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            run_migrations: config::flag("DB_RUN_MIGRATIONS", false)?,
        })
    }
}

/// Create a connection pool from the configuration.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!(max_connections = config.max_connections, "Database pool created");
    Ok(pool)
}

/// Round-trip a trivial query to prove the pool is usable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the bundled migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    sqlx::migrate!("../../db/migrations").run(pool).await?;
    Ok(())
}
