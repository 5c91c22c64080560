//! Demosaicing: fills the two missing channels of every site.
//!
//! Variants implement [`Demosaicer`] and are selected through
//! [`DemosaicAlgorithm`]. [`interpolate`] wraps the chosen variant with the
//! shared steps: the fallback for layouts the variants cannot handle, the
//! optional split and remix of the green lattices, and the median passes.

pub mod ahd;
pub mod lab;
pub mod linear;
pub mod lmmse;
pub mod post;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::image_pipeline::color::ColorMatrix;
use crate::image_pipeline::common::{CancellationToken, PipelineError, Result, SparseColorBuffer};
use crate::image_pipeline::debayer::border_interpolate;
use crate::image_pipeline::raw::CfaPattern;

pub use ahd::AhdDemosaicer;
pub use linear::LinearDemosaicer;
pub use lmmse::LmmseDemosaicer;
pub use post::{median_filter, mix_green, split_green_lattices};

/// Interchangeable interpolation algorithm.
///
/// Input is a sparse buffer whose greens are merged (`colors == 3`), holding
/// one sample per site in the slot `cfa` names. Output holds all three
/// channels at every site.
pub trait Demosaicer: Send + Sync {
    fn name(&self) -> &'static str;

    fn demosaic(
        &self,
        buffer: SparseColorBuffer,
        cfa: &CfaPattern,
        cam_to_xyz: &ColorMatrix,
        cancel: &CancellationToken,
    ) -> Result<SparseColorBuffer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DemosaicAlgorithm {
    #[default]
    Ahd,
    Lmmse,
    Linear,
}

impl DemosaicAlgorithm {
    pub fn demosaicer(self) -> Box<dyn Demosaicer> {
        match self {
            DemosaicAlgorithm::Ahd => Box::new(AhdDemosaicer),
            DemosaicAlgorithm::Lmmse => Box::new(LmmseDemosaicer),
            DemosaicAlgorithm::Linear => Box::new(LinearDemosaicer),
        }
    }

    fn min_side(self) -> usize {
        match self {
            DemosaicAlgorithm::Ahd => ahd::MIN_SIDE,
            DemosaicAlgorithm::Lmmse => lmmse::MIN_SIDE,
            DemosaicAlgorithm::Linear => 2,
        }
    }
}

impl std::str::FromStr for DemosaicAlgorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ahd" => Ok(DemosaicAlgorithm::Ahd),
            "lmmse" => Ok(DemosaicAlgorithm::Lmmse),
            "linear" => Ok(DemosaicAlgorithm::Linear),
            other => Err(PipelineError::InputReadError(format!(
                "unknown demosaic algorithm '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpolateOptions {
    pub algorithm: DemosaicAlgorithm,
    /// Keep the two green lattices apart until they are mixed.
    pub four_color: bool,
    pub median_passes: u32,
}

/// Demosaics `buffer` and applies the post-interpolation steps.
///
/// `cfa` must be the pattern after green merging. Layouts without a 2×2 Bayer
/// cell, sensors with a real fourth colour and frames too small for the
/// selected variant are reconstructed by neighbour averaging instead.
pub fn interpolate(
    buffer: SparseColorBuffer,
    cfa: &CfaPattern,
    cam_to_xyz: &ColorMatrix,
    options: &InterpolateOptions,
    cancel: &CancellationToken,
) -> Result<SparseColorBuffer> {
    let width = buffer.width();
    let height = buffer.height();
    let side = width.min(height);
    let supported = cfa.bayer_cell().is_some() && buffer.colors == 3;

    let mut buffer = if supported && side >= options.algorithm.min_side() {
        let demosaicer = options.algorithm.demosaicer();
        info!("Interpolating {}x{} with {}", width, height, demosaicer.name());
        demosaicer.demosaic(buffer, cfa, cam_to_xyz, cancel)?
    } else {
        warn!(
            "No {:?} interpolation for {}x{} pattern {:#010x} ({} colours), averaging neighbours",
            options.algorithm,
            width,
            height,
            cfa.id(),
            buffer.colors
        );
        let mut buffer = buffer;
        border_interpolate(&mut buffer, cfa, width.max(height));
        buffer
    };

    // A real fourth channel is left for colour conversion to fold.
    if options.four_color && buffer.colors == 3 && cfa.is_bayer() {
        split_green_lattices(&mut buffer, cfa);
        mix_green(&mut buffer);
    }

    if options.median_passes > 0 {
        median_filter(&mut buffer, options.median_passes);
    }
    Ok(buffer)
}
