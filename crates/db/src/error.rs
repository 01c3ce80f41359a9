use modelforge_core::types::DbId;

/// Errors raised by the status store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The row exists but cannot be turned into a typed entity.
    #[error("Invalid {entity} record {id}: {reason}")]
    InvalidRecord {
        entity: &'static str,
        id: DbId,
        reason: String,
    },

    /// An update matched no row.
    #[error("No {entity} row with id {id}")]
    RowMissing { entity: &'static str, id: DbId },
}
