use thiserror::Error;

use crate::image_pipeline::state::Stage;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode RAW image: {0}")]
    DecodeError(String),

    #[error("Failed to encode output image: {0}")]
    EncodeError(String),

    #[error("Unsupported sensor pattern: {0}")]
    UnsupportedSensorPattern(String),

    #[error("Failed to allocate {bytes} bytes for {what}")]
    BufferAllocationFailure { what: &'static str, bytes: usize },

    #[error("Stage {stage} failed: {reason}")]
    StageComputeFailure { stage: Stage, reason: String },

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),

    /// Raised between stages or tiles once cancellation was requested.
    /// Runs report it as [`PipelineOutcome::Cancelled`], never as a failure.
    ///
    /// [`PipelineOutcome::Cancelled`]: crate::image_pipeline::conversions::PipelineOutcome::Cancelled
    #[error("Pipeline run was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    pub fn stage(stage: Stage, reason: impl Into<String>) -> Self {
        Self::StageComputeFailure {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
