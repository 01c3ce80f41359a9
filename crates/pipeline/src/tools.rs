//! Command lines for the reconstruction and conversion tools.

use modelforge_core::job::BuildParams;
use modelforge_core::paths::WorkDirs;

use crate::config::PipelineConfig;
use crate::runner::ToolInvocation;

/// `<reconstruct> <image_dir> <out_dir>/model.usdz -d <detail> -o <ordering> -f <feature>`
pub fn reconstruct(
    config: &PipelineConfig,
    dirs: &WorkDirs,
    params: &BuildParams,
) -> ToolInvocation {
    let model = dirs.model_path();
    ToolInvocation {
        command: config.reconstruct.clone(),
        args: vec![
            dirs.image_dir.display().to_string(),
            model.display().to_string(),
            "-d".into(),
            params.detail.clone(),
            "-o".into(),
            params.ordering.clone(),
            "-f".into(),
            params.feature.clone(),
        ],
        working_dir: Some(config.tools_dir.clone()),
        expected_output: Some(model),
        timeout: config.build_timeout,
    }
}

/// `<convert> <out_dir>/model.usdz`. Success is judged by exit code only.
pub fn convert(config: &PipelineConfig, dirs: &WorkDirs) -> ToolInvocation {
    ToolInvocation {
        command: config.convert.clone(),
        args: vec![dirs.model_path().display().to_string()],
        working_dir: Some(config.tools_dir.clone()),
        expected_output: None,
        timeout: config.convert_timeout,
    }
}
