//! RAW image data types

use crate::image_pipeline::color::ColorMatrix;
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::raw::cfa::CfaPattern;

/// Per-tile black level grid, repeating over the active area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackGrid {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<u32>,
}

impl BlackGrid {
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> u32 {
        self.values[(row % self.rows) * self.cols + col % self.cols]
    }
}

/// Black level components as reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlackLevels {
    /// Level common to every site.
    pub black: u32,
    /// Additional level per channel slot.
    pub per_channel: [u32; 4],
    /// Optional repeating per-tile component.
    pub grid: Option<BlackGrid>,
}

impl BlackLevels {
    pub fn uniform(per_channel: [u32; 4]) -> Self {
        Self {
            black: 0,
            per_channel,
            grid: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CameraIdentity {
    pub make: String,
    pub model: String,
    pub lens: Option<String>,
}

/// Immutable snapshot of a decoded RAW file.
///
/// `data` covers the full sensor (`raw_width * raw_height`, row-major); the
/// active image is the `width * height` window at (`top_margin`, `left_margin`).
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub raw_width: usize,
    pub raw_height: usize,
    pub top_margin: usize,
    pub left_margin: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
    pub cfa: CfaPattern,
    /// Distinct sensor colours (3 for RGB sensors, 4 for e.g. CMYG).
    pub colors: usize,
    pub black: BlackLevels,
    /// Camera-native to CIE XYZ (D65); column 3 applies to the fourth channel.
    pub cam_to_xyz: ColorMatrix,
    /// Capture white balance multipliers per channel slot.
    pub wb_multipliers: [f32; 4],
    /// Optional 8×8 block sampled from a neutral calibration target.
    pub white_samples: Option<[[u16; 8]; 8]>,
    /// Largest valid sample (white level).
    pub maximum: u32,
    /// Counter-clockwise quarter turns needed to display the frame upright.
    pub quarter_turns: u8,
    pub camera: CameraIdentity,
}

impl RawFrame {
    /// Sample at active-area coordinates.
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> u16 {
        self.data[(row + self.top_margin) * self.raw_width + col + self.left_margin]
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidDimensions(self.width, self.height));
        }
        if self.top_margin + self.height > self.raw_height
            || self.left_margin + self.width > self.raw_width
        {
            return Err(PipelineError::DecodeError(format!(
                "active area {}x{}+{}+{} exceeds sensor {}x{}",
                self.width,
                self.height,
                self.left_margin,
                self.top_margin,
                self.raw_width,
                self.raw_height
            )));
        }
        if self.data.len() < self.raw_width * self.raw_height {
            return Err(PipelineError::DecodeError(format!(
                "mosaic holds {} samples, expected {}",
                self.data.len(),
                self.raw_width * self.raw_height
            )));
        }
        if let Some(grid) = &self.black.grid {
            if grid.rows == 0 || grid.cols == 0 || grid.values.len() < grid.rows * grid.cols {
                return Err(PipelineError::DecodeError(format!(
                    "malformed {}x{} black level grid",
                    grid.rows, grid.cols
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Uniform RGGB frame without margins.
    pub fn uniform_rggb(width: usize, height: usize, value: u16, black: [u32; 4]) -> RawFrame {
        RawFrame {
            raw_width: width,
            raw_height: height,
            top_margin: 0,
            left_margin: 0,
            width,
            height,
            data: vec![value; width * height],
            cfa: CfaPattern::rggb(),
            colors: 3,
            black: BlackLevels::uniform(black),
            cam_to_xyz: ColorMatrix::srgb_to_xyz(),
            wb_multipliers: [1.0, 1.0, 1.0, 1.0],
            white_samples: None,
            maximum: 4095,
            quarter_turns: 0,
            camera: CameraIdentity::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::uniform_rggb;
    use super::*;

    #[test]
    fn sample_honours_margins() {
        let mut frame = uniform_rggb(4, 4, 0, [0; 4]);
        frame.data[2 * 4 + 3] = 77;
        frame.top_margin = 1;
        frame.left_margin = 1;
        frame.width = 3;
        frame.height = 3;
        assert_eq!(frame.sample(1, 2), 77);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_active_area() {
        let mut frame = uniform_rggb(4, 4, 0, [0; 4]);
        frame.left_margin = 1;
        assert!(matches!(frame.validate(), Err(PipelineError::DecodeError(_))));
    }
}
