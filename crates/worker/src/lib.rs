//! Queue-driven worker process: consumes job ids and runs the pipeline.

pub mod config;
pub mod consumer;
