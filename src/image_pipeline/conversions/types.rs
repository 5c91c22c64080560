//! Pipeline configuration, jobs and outcomes

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::image_pipeline::cache::ImageIdentity;
use crate::image_pipeline::color::{Histogram, ToneCurve, WorkingSpace};
use crate::image_pipeline::common::{CancellationToken, PipelineError, RgbaBufferF32};
use crate::image_pipeline::demosaic::DemosaicAlgorithm;
use crate::image_pipeline::pixel_format::Morphology;
use crate::image_pipeline::state::StageTimings;

/// Settings of the stages up to and including the cache checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub algorithm: DemosaicAlgorithm,
    /// Median passes over the colour differences after interpolation.
    pub median_passes: u32,
    /// Interpolate the two green lattices separately and average them.
    pub four_color: bool,
    pub working_space: WorkingSpace,
    pub tone_curve: ToneCurve,
    /// Scale the tone curve to the histogram's white point instead of the
    /// full 16-bit range.
    pub adaptive_white: bool,
    pub validate_dimensions: bool,
    pub max_dimension: Option<usize>,
    /// Concurrent runs; `None` uses one per available core.
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            algorithm: DemosaicAlgorithm::Ahd,
            median_passes: 0,
            four_color: false,
            working_space: WorkingSpace::Srgb,
            tone_curve: ToneCurve::Srgb,
            adaptive_white: true,
            validate_dimensions: true,
            max_dimension: None,
            workers: None,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    algorithm: Option<DemosaicAlgorithm>,
    median_passes: Option<u32>,
    four_color: Option<bool>,
    working_space: Option<WorkingSpace>,
    tone_curve: Option<ToneCurve>,
    adaptive_white: Option<bool>,
    validate_dimensions: Option<bool>,
    max_dimension: Option<Option<usize>>,
    workers: Option<Option<usize>>,
}

impl PipelineConfigBuilder {
    pub fn algorithm(mut self, algorithm: DemosaicAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn median_passes(mut self, passes: u32) -> Self {
        self.median_passes = Some(passes);
        self
    }

    pub fn four_color(mut self, enable: bool) -> Self {
        self.four_color = Some(enable);
        self
    }

    pub fn working_space(mut self, space: WorkingSpace) -> Self {
        self.working_space = Some(space);
        self
    }

    pub fn tone_curve(mut self, curve: ToneCurve) -> Self {
        self.tone_curve = Some(curve);
        self
    }

    pub fn adaptive_white(mut self, enable: bool) -> Self {
        self.adaptive_white = Some(enable);
        self
    }

    pub fn validate_dimensions(mut self, validate: bool) -> Self {
        self.validate_dimensions = Some(validate);
        self
    }

    pub fn max_dimension(mut self, max: Option<usize>) -> Self {
        self.max_dimension = Some(max);
        self
    }

    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        PipelineConfig {
            algorithm: self.algorithm.unwrap_or(default.algorithm),
            median_passes: self.median_passes.unwrap_or(default.median_passes),
            four_color: self.four_color.unwrap_or(default.four_color),
            working_space: self.working_space.unwrap_or(default.working_space),
            tone_curve: self.tone_curve.unwrap_or(default.tone_curve),
            adaptive_white: self.adaptive_white.unwrap_or(default.adaptive_white),
            validate_dimensions: self.validate_dimensions.unwrap_or(default.validate_dimensions),
            max_dimension: self.max_dimension.unwrap_or(default.max_dimension),
            workers: self.workers.unwrap_or(default.workers),
        }
    }
}

/// Parameters of the stages after the cache checkpoint. Changing them never
/// invalidates cached data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    /// Extra counter-clockwise quarter turns on top of the camera orientation.
    pub rotation: u8,
    pub convolution: Option<[f32; 9]>,
    pub morphology: Option<(Morphology, usize)>,
    /// Input range stretched onto `[0, 1]`.
    pub contrast: Option<(f32, f32)>,
}

/// Where a job's RAW bytes come from. Only read when the run cannot resume
/// from the cache.
#[derive(Clone)]
pub enum RawSource {
    File(PathBuf),
    Bytes(Arc<[u8]>),
}

impl RawSource {
    pub fn load(&self) -> Result<Arc<[u8]>, PipelineError> {
        match self {
            RawSource::File(path) => std::fs::read(path)
                .map(Arc::from)
                .map_err(|e| PipelineError::InputReadError(format!("{}: {}", path.display(), e))),
            RawSource::Bytes(bytes) => Ok(Arc::clone(bytes)),
        }
    }
}

impl fmt::Debug for RawSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawSource::File(path) => write!(f, "File({})", path.display()),
            RawSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub identity: ImageIdentity,
    pub source: RawSource,
    /// Resume from and store into the cache.
    pub use_cache: bool,
    pub adjustments: Adjustments,
}

impl PipelineJob {
    pub fn new(identity: impl Into<ImageIdentity>, source: RawSource) -> Self {
        Self {
            identity: identity.into(),
            source,
            use_cache: true,
            adjustments: Adjustments::default(),
        }
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn adjustments(mut self, adjustments: Adjustments) -> Self {
        self.adjustments = adjustments;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FinalImage {
    /// Interleaved RGBA, alpha 1.0.
    pub image: RgbaBufferF32,
    pub histogram: Histogram,
    /// Whether the run resumed from the cache checkpoint.
    pub from_cache: bool,
    pub timings: StageTimings,
}

/// Result delivered to the completion callback: exactly one per run.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(FinalImage),
    Cancelled,
    Failed(PipelineError),
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed(_))
    }

    pub fn into_result(self) -> Result<FinalImage, PipelineError> {
        match self {
            PipelineOutcome::Completed(image) => Ok(image),
            PipelineOutcome::Cancelled => Err(PipelineError::Cancelled),
            PipelineOutcome::Failed(e) => Err(e),
        }
    }
}

pub type CompletionCallback = Box<dyn FnOnce(PipelineOutcome) + Send>;

/// Handle to a queued run.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub(crate) cancel: CancellationToken,
}

impl JobHandle {
    /// Requests cancellation; the run stops before its next stage.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
