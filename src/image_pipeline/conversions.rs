//! Pipeline orchestration
//!
//! Runs decoded frames through every stage, resumes from the intermediate
//! cache when it can, and schedules runs on a worker pool.

mod raw_to_rgb;
pub mod types;

pub use raw_to_rgb::RawPipeline;
pub use types::{
    Adjustments, CompletionCallback, FinalImage, JobHandle, PipelineConfig, PipelineConfigBuilder,
    PipelineJob, PipelineOutcome, RawSource,
};
