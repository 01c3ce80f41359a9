//! Job-scoped local directories and remote object keys.
//!
//! Both the local filesystem and the content store are partitioned by job
//! id, so two jobs never touch the same path or key.

use std::path::{Path, PathBuf};

use crate::types::DbId;

/// File name the reconstruction tool writes and the notifier sends.
pub const PRIMARY_ARTIFACT: &str = "model.usdz";

/// Subdirectory / key segment holding input images.
const IMAGES_SEGMENT: &str = "images";

/// Subdirectory / key segment holding build output.
const MODEL_SEGMENT: &str = "model";

/// The per-job working directory pair under `<root>/<id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
    pub job_root: PathBuf,
    pub image_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl WorkDirs {
    pub fn for_job(projects_root: &Path, job_id: DbId) -> Self {
        let job_root = projects_root.join(job_id.to_string());
        Self {
            image_dir: job_root.join(IMAGES_SEGMENT),
            out_dir: job_root.join(MODEL_SEGMENT),
            job_root,
        }
    }

    /// Path of the primary artifact inside `out_dir`.
    pub fn model_path(&self) -> PathBuf {
        self.out_dir.join(PRIMARY_ARTIFACT)
    }
}

/// Content-store prefix shared by all of a job's objects.
pub fn job_prefix(job_id: DbId) -> String {
    job_id.to_string()
}

/// Key of an uploaded input image: `<id>/images/<file>`.
pub fn input_key(job_id: DbId, file_name: &str) -> String {
    format!("{}/{IMAGES_SEGMENT}/{file_name}", job_prefix(job_id))
}

/// Key of a published artifact: `<prefix>/model/<file>`.
pub fn output_key(prefix: &str, file_name: &str) -> String {
    format!("{prefix}/{MODEL_SEGMENT}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_dirs_are_job_scoped() {
        let dirs = WorkDirs::for_job(Path::new("/data/projects"), 42);
        assert_eq!(dirs.job_root, PathBuf::from("/data/projects/42"));
        assert_eq!(dirs.image_dir, PathBuf::from("/data/projects/42/images"));
        assert_eq!(dirs.out_dir, PathBuf::from("/data/projects/42/model"));
        assert_eq!(
            dirs.model_path(),
            PathBuf::from("/data/projects/42/model/model.usdz")
        );
    }

    #[test]
    fn keys_follow_layout() {
        assert_eq!(input_key(42, "a.jpg"), "42/images/a.jpg");
        assert_eq!(output_key(&job_prefix(42), "model.usdz"), "42/model/model.usdz");
    }
}
