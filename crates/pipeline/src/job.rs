//! The per-job state machine.
//!
//! [`JobPipeline::run`] walks a job through
//! `Loaded → Processing → Staged → Built → Cleaned → Converted → Published →
//! Notified → Done`. Staging, building and publishing are fatal on failure
//! and force an `error` status; cleanup, conversion, notification and purge
//! are best effort and only add a [`SoftFailure`] to the [`RunReport`].

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use modelforge_cloud::ObjectFetcher;
use modelforge_core::job::Job;
use modelforge_core::paths::{job_prefix, WorkDirs};
use modelforge_core::types::DbId;
use modelforge_db::{DbError, ProjectStore};
use modelforge_events::messages;
use modelforge_events::{Notifier, NotifyError};

use crate::config::PipelineConfig;
use crate::publisher::{ArtifactPublisher, PublishError};
use crate::runner::{self, ToolError};
use crate::stager::AssetStager;
use crate::tools;

// ---------------------------------------------------------------------------
// Stages and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loaded,
    Processing,
    Staged,
    Built,
    Cleaned,
    Converted,
    Published,
    Notified,
    Done,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Processing => "processing",
            Self::Staged => "staged",
            Self::Built => "built",
            Self::Cleaned => "cleaned",
            Self::Converted => "converted",
            Self::Published => "published",
            Self::Notified => "notified",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A best-effort step that failed without changing the job's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    /// Stage that would have been entered had the step succeeded.
    pub stage: PipelineStage,
    pub message: String,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub job_id: DbId,
    /// Keys written by the publisher, in upload order.
    pub artifacts: Vec<String>,
    /// Stages entered, in order.
    pub stages: Vec<PipelineStage>,
    pub warnings: Vec<SoftFailure>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn new(job_id: DbId) -> Self {
        Self {
            job_id,
            artifacts: Vec::new(),
            stages: Vec::new(),
            warnings: Vec::new(),
            elapsed_ms: 0,
        }
    }

    fn enter(&mut self, stage: PipelineStage, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(job_id = self.job_id, stage = %stage, elapsed_ms, "Stage completed");
        self.stages.push(stage);
    }

    fn warn(&mut self, stage: PipelineStage, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(job_id = self.job_id, stage = %stage, error = %message, "Best-effort step failed");
        self.warnings.push(SoftFailure { stage, message });
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Job {0} does not exist")]
    NoSuchJob(DbId),

    #[error("Job {0} has no files to process")]
    NoFiles(DbId),

    #[error("Staging failed for job {job_id}: {reason}")]
    StagingFailed { job_id: DbId, reason: String },

    #[error("Reconstruction failed: {0}")]
    BuildFailed(#[source] ToolError),

    #[error("Publishing failed: {0}")]
    PublishFailed(#[from] PublishError),

    #[error("Failed to record status for job {job_id}: {source}")]
    StatusUpdateFailed {
        job_id: DbId,
        #[source]
        source: DbError,
    },

    #[error("Failed to load job: {0}")]
    Store(#[source] DbError),

    #[error("Workspace error ({context}) at {path:?}: {source}")]
    Workspace {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job run cancelled")]
    Cancelled,
}

/// Reasons the notify step can fall short.
#[derive(Debug, thiserror::Error)]
enum NotifyFailure {
    #[error("no notifier is configured")]
    Disabled,

    #[error("recipient {0} not found")]
    UnknownRecipient(DbId),

    #[error("recipient lookup failed: {0}")]
    Lookup(#[from] DbError),

    #[error(transparent)]
    Send(#[from] NotifyError),
}

// ---------------------------------------------------------------------------
// JobPipeline
// ---------------------------------------------------------------------------

pub struct JobPipeline {
    store: Arc<dyn ProjectStore>,
    stager: AssetStager,
    publisher: ArtifactPublisher,
    notifier: Option<Arc<dyn Notifier>>,
    config: PipelineConfig,
}

impl JobPipeline {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        fetcher: ObjectFetcher,
        http: reqwest::Client,
        notifier: Option<Arc<dyn Notifier>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            stager: AssetStager::new(fetcher.clone(), http),
            publisher: ArtifactPublisher::new(fetcher),
            notifier,
            config: config.with_absolute_paths(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute job `job_id` end to end.
    ///
    /// Fatal failures after the job is marked `processing` write
    /// `status = error` before the error is returned. A cancelled run writes
    /// no terminal status.
    pub async fn run(
        &self,
        job_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let mut report = RunReport::new(job_id);

        let job = self
            .store
            .load_job(job_id)
            .await
            .map_err(PipelineError::Store)?
            .ok_or(PipelineError::NoSuchJob(job_id))?;
        report.enter(PipelineStage::Loaded, started);
        if job.status.is_terminal() {
            tracing::info!(job_id, previous = %job.status, "Job already finished once, running it again");
        }

        if let Err(e) = job.validate_files() {
            tracing::error!(job_id, error = %e, "Rejecting job without input files");
            self.record_error(job_id).await;
            return Err(PipelineError::NoFiles(job_id));
        }
        checkpoint(cancel)?;

        let stage_started = Instant::now();
        if let Err(source) = self.store.mark_processing(job_id, Utc::now()).await {
            self.record_error(job_id).await;
            return Err(PipelineError::StatusUpdateFailed { job_id, source });
        }
        report.enter(PipelineStage::Processing, stage_started);

        tracing::info!(
            job_id,
            files = job.files.len(),
            mode = ?job.staging_mode(),
            "Job started",
        );

        let dirs = WorkDirs::for_job(&self.config.projects_root, job_id);
        match self.execute(&job, &dirs, cancel, &mut report).await {
            Ok(artifacts) => report.artifacts = artifacts,
            Err(PipelineError::Cancelled) => {
                tracing::warn!(job_id, stage = ?report.stages.last(), "Job cancelled, leaving status for redelivery");
                return Err(PipelineError::Cancelled);
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Job failed");
                self.record_error(job_id).await;
                return Err(e);
            }
        }

        if let Err(source) = self
            .store
            .mark_done(job_id, Utc::now(), &report.artifacts)
            .await
        {
            tracing::error!(job_id, error = %source, "Failed to record job completion");
            self.record_error(job_id).await;
            return Err(PipelineError::StatusUpdateFailed { job_id, source });
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.enter(PipelineStage::Done, started);
        tracing::info!(
            job_id,
            artifacts = report.artifacts.len(),
            warnings = report.warnings.len(),
            elapsed_ms = report.elapsed_ms,
            "Job done",
        );
        Ok(report)
    }

    /// Everything between `processing` and the final status write.
    async fn execute(
        &self,
        job: &Job,
        dirs: &WorkDirs,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<Vec<String>, PipelineError> {
        let job_id = job.id;

        // Stage inputs.
        let stage_started = Instant::now();
        // Images left by an earlier failed attempt are kept: in storage mode
        // they are the only remaining copy.
        tokio::fs::create_dir_all(&dirs.image_dir)
            .await
            .map_err(|source| PipelineError::Workspace {
                context: "create image directory",
                path: dirs.image_dir.clone(),
                source,
            })?;
        let summary = cancellable(cancel, self.stager.stage(job, &dirs.image_dir))
            .await?
            .map_err(|e| PipelineError::StagingFailed {
                job_id,
                reason: e.to_string(),
            })?;

        let present = count_files(&dirs.image_dir).await?;
        if present == 0 {
            return Err(PipelineError::StagingFailed {
                job_id,
                reason: "no input files were staged".to_string(),
            });
        }
        if !summary.skipped.is_empty() {
            let names: Vec<_> = summary.skipped.iter().map(|s| s.name.as_str()).collect();
            report.warn(
                PipelineStage::Staged,
                format!("{} input(s) skipped: {}", names.len(), names.join(", ")),
            );
        }
        tracing::info!(job_id, staged = present, "Inputs staged");
        report.enter(PipelineStage::Staged, stage_started);
        checkpoint(cancel)?;

        // Reconstruct.
        let stage_started = Instant::now();
        fresh_dir(&dirs.out_dir, "create output directory").await?;
        let build = tools::reconstruct(&self.config, dirs, &job.params);
        match runner::run(&build, cancel).await {
            Ok(output) => {
                tracing::debug!(job_id, duration_ms = output.duration_ms, "Reconstruction finished");
            }
            Err(ToolError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => return Err(PipelineError::BuildFailed(e)),
        }
        report.enter(PipelineStage::Built, stage_started);

        // Drop the inputs.
        let stage_started = Instant::now();
        match tokio::fs::remove_dir_all(&dirs.image_dir).await {
            Ok(()) => report.enter(PipelineStage::Cleaned, stage_started),
            Err(e) => report.warn(PipelineStage::Cleaned, format!("image cleanup: {e}")),
        }
        checkpoint(cancel)?;

        // Convert.
        let stage_started = Instant::now();
        let convert = tools::convert(&self.config, dirs);
        match runner::run(&convert, cancel).await {
            Ok(_) => report.enter(PipelineStage::Converted, stage_started),
            Err(ToolError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => report.warn(PipelineStage::Converted, format!("conversion: {e}")),
        }
        checkpoint(cancel)?;

        // Publish.
        let stage_started = Instant::now();
        let artifacts =
            cancellable(cancel, self.publisher.publish(&dirs.out_dir, &job_prefix(job_id)))
                .await??;
        report.enter(PipelineStage::Published, stage_started);

        // Notify.
        if let Some(target) = job.notify_target {
            let stage_started = Instant::now();
            match self.notify(job_id, target, dirs).await {
                Ok(()) => report.enter(PipelineStage::Notified, stage_started),
                Err(e) => report.warn(PipelineStage::Notified, format!("notification: {e}")),
            }
        }

        // Purge.
        if !self.config.retain_workdir {
            if let Err(e) = remove_if_present(&dirs.job_root).await {
                report.warn(PipelineStage::Done, format!("workdir purge: {e}"));
            }
        }

        Ok(artifacts)
    }

    /// Send the status text, the viewer link and the primary artifact.
    async fn notify(&self, job_id: DbId, target: DbId, dirs: &WorkDirs) -> Result<(), NotifyFailure> {
        let notifier = self.notifier.as_ref().ok_or(NotifyFailure::Disabled)?;
        let chat_id = self
            .store
            .recipient_chat_id(target)
            .await?
            .ok_or(NotifyFailure::UnknownRecipient(target))?;

        notifier
            .send_message(chat_id, &messages::completion_text(job_id))
            .await?;
        notifier
            .send_message(
                chat_id,
                &messages::download_link_text(&self.config.viewer_base_url, job_id),
            )
            .await?;
        notifier.send_document(chat_id, &dirs.model_path()).await?;

        tracing::info!(job_id, chat_id, "Recipient notified");
        Ok(())
    }

    /// Best-effort `status = error` write.
    async fn record_error(&self, job_id: DbId) {
        if let Err(e) = self.store.mark_error(job_id, Utc::now()).await {
            tracing::error!(job_id, error = %e, "Failed to record error status");
        }
    }
}

impl std::fmt::Debug for JobPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPipeline")
            .field("config", &self.config)
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn checkpoint(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Race `fut` against cancellation.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Recreate `path` as an empty directory.
async fn fresh_dir(path: &Path, context: &'static str) -> Result<(), PipelineError> {
    let workspace_err = |source| PipelineError::Workspace {
        context,
        path: path.to_path_buf(),
        source,
    };
    remove_if_present(path).await.map_err(workspace_err)?;
    tokio::fs::create_dir_all(path).await.map_err(workspace_err)
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Number of regular files directly inside `dir`.
async fn count_files(dir: &Path) -> Result<usize, PipelineError> {
    let workspace_err = |source| PipelineError::Workspace {
        context: "list staged inputs",
        path: dir.to_path_buf(),
        source,
    };

    let mut reader = tokio::fs::read_dir(dir).await.map_err(workspace_err)?;
    let mut count = 0;
    while let Some(entry) = reader.next_entry().await.map_err(workspace_err)? {
        if entry.file_type().await.map_err(workspace_err)?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
