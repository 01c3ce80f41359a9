//! Row model for the `project` table and its conversion into a [`Job`].

use sqlx::FromRow;

use modelforge_core::job::{BuildParams, Job, JobStatus};
use modelforge_core::types::{DbId, Timestamp};

use crate::error::DbError;

/// A row from the `project` table, exactly as stored.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: DbId,
    pub status: String,
    pub files: Option<Vec<String>>,
    pub detail: Option<String>,
    pub ordering: Option<String>,
    pub feature: Option<String>,
    pub telegram_user: Option<DbId>,
    pub process_start: Option<Timestamp>,
    pub process_end: Option<Timestamp>,
    pub model_urls: Option<Vec<String>>,
}

impl TryFrom<ProjectRow> for Job {
    type Error = DbError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse().map_err(|e| DbError::InvalidRecord {
            entity: "project",
            id: row.id,
            reason: format!("{e}"),
        })?;

        Ok(Job {
            id: row.id,
            status,
            files: row.files.unwrap_or_default(),
            params: BuildParams::from_record(row.detail, row.ordering, row.feature),
            notify_target: row.telegram_user,
            process_start: row.process_start,
            process_end: row.process_end,
            artifact_locations: row.model_urls.unwrap_or_default(),
        })
    }
}
