//! Job entity: one photogrammetry reconstruction request.
//!
//! The status store holds a loosely typed row; [`Job`] is its validated,
//! typed view with defaults already applied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Default detail level passed to the reconstruction tool.
pub const DEFAULT_DETAIL: &str = "reduced";

/// Default sample ordering hint passed to the reconstruction tool.
pub const DEFAULT_ORDERING: &str = "unordered";

/// Default feature sensitivity passed to the reconstruction tool.
pub const DEFAULT_FEATURE: &str = "normal";

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status stored in the `project.status` text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    /// Database text value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// `done` and `error` end an execution.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildParams
// ---------------------------------------------------------------------------

/// Opaque reconstruction parameters, forwarded verbatim to the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParams {
    pub detail: String,
    pub ordering: String,
    pub feature: String,
}

impl BuildParams {
    /// Apply defaults to the nullable record columns. Blank strings are
    /// treated the same as missing values.
    pub fn from_record(
        detail: Option<String>,
        ordering: Option<String>,
        feature: Option<String>,
    ) -> Self {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self {
            detail: or_default(detail, DEFAULT_DETAIL),
            ordering: or_default(ordering, DEFAULT_ORDERING),
            feature: or_default(feature, DEFAULT_FEATURE),
        }
    }
}

impl Default for BuildParams {
    fn default() -> Self {
        Self::from_record(None, None, None)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Where a job's input images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    /// `files` are object names under `<id>/images/` in the content store.
    Storage,
    /// `files` are externally hosted URLs (chat uploads).
    Remote,
}

/// Typed view of a `project` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: DbId,
    pub status: JobStatus,
    pub files: Vec<String>,
    pub params: BuildParams,
    /// `telegram_user` row to notify on completion.
    pub notify_target: Option<DbId>,
    pub process_start: Option<Timestamp>,
    pub process_end: Option<Timestamp>,
    pub artifact_locations: Vec<String>,
}

impl Job {
    /// A fresh pending job with default build parameters.
    pub fn new(id: DbId, files: Vec<String>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            files,
            params: BuildParams::default(),
            notify_target: None,
            process_start: None,
            process_end: None,
            artifact_locations: Vec::new(),
        }
    }

    /// Jobs with a notify target were submitted through chat and carry URLs.
    pub fn staging_mode(&self) -> StagingMode {
        if self.notify_target.is_some() {
            StagingMode::Remote
        } else {
            StagingMode::Storage
        }
    }

    /// A job without input files cannot be processed.
    pub fn validate_files(&self) -> Result<(), CoreError> {
        if self.files.iter().all(|f| f.trim().is_empty()) {
            return Err(CoreError::Validation(format!(
                "Job {} has no files to process",
                self.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
