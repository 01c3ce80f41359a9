//! Repository for the `project` table.
//!
//! The worker only ever performs single-row updates keyed by id, so no
//! explicit locking is needed: one execution owns a job at a time.

use sqlx::PgPool;

use modelforge_core::job::JobStatus;
use modelforge_core::types::{DbId, Timestamp};

use crate::models::project::ProjectRow;

/// Column list for `project` queries.
const COLUMNS: &str = "\
    id, status, files, detail, ordering, feature, telegram_user, \
    process_start, process_end, model_urls";

/// Status-store operations on jobs.
pub struct ProjectRepo;

impl ProjectRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProjectRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM project WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Enter `processing` and stamp `process_start`.
    ///
    /// Clears `process_end` so a redelivered job does not keep the end
    /// time of its previous attempt. Returns the number of rows touched.
    pub async fn mark_processing(
        pool: &PgPool,
        id: DbId,
        started_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE project \
             SET status = $2, process_start = $3, process_end = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Processing.as_str())
        .bind(started_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Enter `done`, stamp `process_end` and store the artifact keys.
    pub async fn mark_done(
        pool: &PgPool,
        id: DbId,
        finished_at: Timestamp,
        model_urls: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE project \
             SET status = $2, process_end = $3, model_urls = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Done.as_str())
        .bind(finished_at)
        .bind(model_urls)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Enter `error` and stamp `process_end`. Artifact keys are left alone.
    pub async fn mark_error(
        pool: &PgPool,
        id: DbId,
        finished_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE project SET status = $2, process_end = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Error.as_str())
        .bind(finished_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
