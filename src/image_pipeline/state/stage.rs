use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stages in execution order.
///
/// The tag packs the top-level stage in the upper 16 bits and the sub-stage
/// in the lower 16, so tags of one run always compare in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum Stage {
    Initializing = 0,
    Debayer = 1 << 16,
    Demosaic = 2 << 16,
    WhiteBalance = (2 << 16) | 1,
    Interpolate = (2 << 16) | 2,
    LensCorrection = 3 << 16,
    Vignetting = (3 << 16) | 1,
    Distortion = (3 << 16) | 2,
    ColorConvert = 4 << 16,
    RotateFlip = 5 << 16,
    Convolution = 6 << 16,
    Morphological = 7 << 16,
    HistogramModification = 8 << 16,
    FormatConvert = 9 << 16,
    FilterGraph = 10 << 16,
    FinalHistogram = 11 << 16,
}

impl Stage {
    pub const ALL: [Stage; 16] = [
        Stage::Initializing,
        Stage::Debayer,
        Stage::Demosaic,
        Stage::WhiteBalance,
        Stage::Interpolate,
        Stage::LensCorrection,
        Stage::Vignetting,
        Stage::Distortion,
        Stage::ColorConvert,
        Stage::RotateFlip,
        Stage::Convolution,
        Stage::Morphological,
        Stage::HistogramModification,
        Stage::FormatConvert,
        Stage::FilterGraph,
        Stage::FinalHistogram,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Stage> {
        Self::ALL.into_iter().find(|s| s.tag() == tag)
    }

    /// Top-level stage this sub-stage belongs to.
    pub fn parent(self) -> Stage {
        match self {
            Stage::WhiteBalance | Stage::Interpolate => Stage::Demosaic,
            Stage::Vignetting | Stage::Distortion => Stage::LensCorrection,
            other => other,
        }
    }

    pub fn is_sub_stage(self) -> bool {
        self.tag() & 0xffff != 0
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Initializing => "initializing",
            Stage::Debayer => "debayer",
            Stage::Demosaic => "demosaic",
            Stage::WhiteBalance => "white balance",
            Stage::Interpolate => "interpolate",
            Stage::LensCorrection => "lens correction",
            Stage::Vignetting => "vignetting",
            Stage::Distortion => "distortion",
            Stage::ColorConvert => "color convert",
            Stage::RotateFlip => "rotate/flip",
            Stage::Convolution => "convolution",
            Stage::Morphological => "morphological",
            Stage::HistogramModification => "histogram modification",
            Stage::FormatConvert => "format convert",
            Stage::FilterGraph => "filter graph",
            Stage::FinalHistogram => "final histogram",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
