//! Pipeline configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use modelforge_core::config;
use modelforge_core::error::ConfigError;

/// Default directory holding the reconstruction and conversion binaries.
const DEFAULT_TOOLS_DIR: &str = "lib";

/// Default wall-clock ceiling for reconstruction (6 hours).
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Default wall-clock ceiling for conversion (30 minutes).
const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 30 * 60;

/// An external program plus any arguments that precede the per-job ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Resolve a bare binary name against `tools_dir`; paths with a
    /// directory component are kept as given.
    fn resolve(tools_dir: &std::path::Path, raw: &str) -> Self {
        let path = PathBuf::from(raw);
        if path.components().count() > 1 {
            Self::new(std::path::absolute(&path).unwrap_or(path))
        } else {
            Self::new(tools_dir.join(path))
        }
    }
}

/// Runtime settings for [`JobPipeline`](crate::JobPipeline).
///
/// | Variable               | Required | Default               |
/// |------------------------|----------|-----------------------|
/// | `PROJECTS_ROOT`        | no       | `projects`            |
/// | `TOOLS_DIR`            | no       | `lib`                 |
/// | `RECONSTRUCT_BIN`      | no       | `HelloPhotogrammetry` |
/// | `CONVERT_BIN`          | no       | `usdconv`             |
/// | `BUILD_TIMEOUT_SECS`   | no       | `21600`               |
/// | `CONVERT_TIMEOUT_SECS` | no       | `1800`                |
/// | `VIEWER_BASE_URL`      | yes      | --                     |
/// | `RETAIN_WORKDIR`       | no       | `false`               |
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which each job gets `<id>/images` and `<id>/model`.
    pub projects_root: PathBuf,
    /// Working directory for both tools.
    pub tools_dir: PathBuf,
    pub reconstruct: ToolCommand,
    pub convert: ToolCommand,
    pub build_timeout: Duration,
    pub convert_timeout: Duration,
    /// Base of the public viewer link sent to the recipient.
    pub viewer_base_url: String,
    /// Keep `<projects_root>/<id>` after the job finishes.
    pub retain_workdir: bool,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Tools run with the tools dir as cwd, so every path handed to them
        // must be absolute.
        let projects_root = absolute_dir(
            "PROJECTS_ROOT",
            &config::or_default("PROJECTS_ROOT", "projects"),
        )?;
        let tools_dir =
            absolute_dir("TOOLS_DIR", &config::or_default("TOOLS_DIR", DEFAULT_TOOLS_DIR))?;

        let reconstruct = ToolCommand::resolve(
            &tools_dir,
            &config::or_default("RECONSTRUCT_BIN", "HelloPhotogrammetry"),
        );
        let convert =
            ToolCommand::resolve(&tools_dir, &config::or_default("CONVERT_BIN", "usdconv"));

        let build_timeout = Duration::from_secs(config::parse_or(
            "BUILD_TIMEOUT_SECS",
            DEFAULT_BUILD_TIMEOUT_SECS,
        )?);
        let convert_timeout = Duration::from_secs(config::parse_or(
            "CONVERT_TIMEOUT_SECS",
            DEFAULT_CONVERT_TIMEOUT_SECS,
        )?);

        Ok(Self {
            projects_root,
            tools_dir,
            reconstruct,
            convert,
            build_timeout,
            convert_timeout,
            viewer_base_url: config::required("VIEWER_BASE_URL")?,
            retain_workdir: config::flag("RETAIN_WORKDIR", false)?,
        })
    }

    /// Resolve `projects_root` and `tools_dir` against the current directory.
    ///
    /// Paths that cannot be resolved are left unchanged.
    pub fn with_absolute_paths(mut self) -> Self {
        if let Ok(root) = std::path::absolute(&self.projects_root) {
            self.projects_root = root;
        }
        if let Ok(dir) = std::path::absolute(&self.tools_dir) {
            self.tools_dir = dir;
        }
        self
    }
}

fn absolute_dir(var: &'static str, raw: &str) -> Result<PathBuf, ConfigError> {
    std::path::absolute(raw).map_err(|e| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
