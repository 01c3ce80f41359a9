//! The status-store seam used by the job pipeline.
//!
//! [`ProjectStore`] is what the pipeline talks to; [`PgProjectStore`] is
//! the production implementation over the repositories.

use async_trait::async_trait;
use sqlx::PgPool;

use modelforge_core::job::{Job, JobStatus};
use modelforge_core::types::{DbId, Timestamp};

use crate::error::DbError;
use crate::repositories::{ProjectRepo, TelegramUserRepo};

const PROJECT: &str = "project";

/// Reads job records and writes status transitions.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Load a job, or `None` when no row has this id.
    async fn load_job(&self, id: DbId) -> Result<Option<Job>, DbError>;

    async fn mark_processing(&self, id: DbId, started_at: Timestamp) -> Result<(), DbError>;

    async fn mark_done(
        &self,
        id: DbId,
        finished_at: Timestamp,
        artifacts: &[String],
    ) -> Result<(), DbError>;

    async fn mark_error(&self, id: DbId, finished_at: Timestamp) -> Result<(), DbError>;

    /// Resolve a notify target to the chat id messages are sent to.
    async fn recipient_chat_id(&self, target: DbId) -> Result<Option<i64>, DbError>;
}

/// PostgreSQL-backed [`ProjectStore`].
#[derive(Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Turn an update's affected-row count into an error when nothing matched.
fn expect_one_row(rows: u64, id: DbId, status: JobStatus) -> Result<(), DbError> {
    if rows == 0 {
        return Err(DbError::RowMissing {
            entity: PROJECT,
            id,
        });
    }
    tracing::debug!(job_id = id, status = %status, "Job status written");
    Ok(())
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn load_job(&self, id: DbId) -> Result<Option<Job>, DbError> {
        ProjectRepo::find_by_id(&self.pool, id)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn mark_processing(&self, id: DbId, started_at: Timestamp) -> Result<(), DbError> {
        let rows = ProjectRepo::mark_processing(&self.pool, id, started_at).await?;
        expect_one_row(rows, id, JobStatus::Processing)
    }

    async fn mark_done(
        &self,
        id: DbId,
        finished_at: Timestamp,
        artifacts: &[String],
    ) -> Result<(), DbError> {
        let rows = ProjectRepo::mark_done(&self.pool, id, finished_at, artifacts).await?;
        expect_one_row(rows, id, JobStatus::Done)
    }

    async fn mark_error(&self, id: DbId, finished_at: Timestamp) -> Result<(), DbError> {
        let rows = ProjectRepo::mark_error(&self.pool, id, finished_at).await?;
        expect_one_row(rows, id, JobStatus::Error)
    }

    async fn recipient_chat_id(&self, target: DbId) -> Result<Option<i64>, DbError> {
        Ok(TelegramUserRepo::find_chat_id(&self.pool, target).await?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn zero_rows_is_row_missing() {
        assert_matches!(
            expect_one_row(0, 5, JobStatus::Done),
            Err(DbError::RowMissing { entity: "project", id: 5 })
        );
    }

    #[test]
    fn one_row_is_ok() {
        assert!(expect_one_row(1, 5, JobStatus::Error).is_ok());
    }
}
