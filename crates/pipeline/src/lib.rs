//! Job execution pipeline for the photogrammetry worker.
//!
//! [`JobPipeline::run`] drives one job from its status record to uploaded
//! artifacts: stage inputs, reconstruct, convert, publish, notify.

pub mod config;
pub mod job;
pub mod publisher;
pub mod runner;
pub mod stager;
pub mod tools;

pub use config::{PipelineConfig, ToolCommand};
pub use job::{JobPipeline, PipelineError, PipelineStage, RunReport, SoftFailure};
pub use publisher::{ArtifactPublisher, PublishError};
pub use runner::{ToolError, ToolInvocation, ToolOutput};
pub use stager::{AssetStager, StagingError, StagingSummary};
