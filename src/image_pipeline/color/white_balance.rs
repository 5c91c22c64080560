//! White balance scaling

use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::color::black_level::NormalizedBlack;
use crate::image_pipeline::common::{PipelineError, Result, SparseColorBuffer};
use crate::image_pipeline::raw::RawFrame;
use crate::image_pipeline::state::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierSource {
    WhiteSamples,
    Capture,
    Unity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhiteBalance {
    pub source: MultiplierSource,
    /// Multipliers normalised so the smallest is 1.0.
    pub pre_mul: [f32; 4],
    /// Factors applied to black-subtracted samples, range expansion included.
    pub scale_mul: [f32; 4],
}

impl WhiteBalance {
    pub fn compute(frame: &RawFrame, black: &NormalizedBlack) -> Result<Self> {
        let (source, mut pre_mul) = match white_sample_multipliers(frame, black) {
            Some(mul) => (MultiplierSource::WhiteSamples, mul),
            None => {
                let cam = frame.wb_multipliers;
                if cam[0] > 0.0 && cam[2] > 0.0 {
                    (MultiplierSource::Capture, cam)
                } else {
                    (MultiplierSource::Unity, [1.0; 4])
                }
            }
        };

        if pre_mul[1] <= 0.0 {
            pre_mul[1] = 1.0;
        }
        if pre_mul[3] <= 0.0 {
            pre_mul[3] = if frame.colors < 4 { pre_mul[1] } else { 1.0 };
        }
        for m in pre_mul.iter_mut().filter(|m| **m <= 0.0) {
            *m = 1.0;
        }

        let range = frame.maximum.checked_sub(black.black).filter(|&r| r > 0).ok_or_else(|| {
            PipelineError::stage(
                Stage::WhiteBalance,
                format!(
                    "white level {} does not exceed black level {}",
                    frame.maximum, black.black
                ),
            )
        })?;

        let min = pre_mul.iter().copied().fold(f32::MAX, f32::min);
        let expand = 65535.0 / range as f32;
        let mut scale_mul = [0.0f32; 4];
        for (scale, m) in scale_mul.iter_mut().zip(pre_mul.iter_mut()) {
            *m /= min;
            *scale = *m * expand;
        }

        debug!(
            "White balance from {:?}: pre_mul {:?}, scale {:?}",
            source, pre_mul, scale_mul
        );

        Ok(Self {
            source,
            pre_mul,
            scale_mul,
        })
    }

    /// Scales every slot in place, clipping to the 16-bit range.
    pub fn apply(&self, buffer: &mut SparseColorBuffer) {
        let scale = self.scale_mul;
        buffer.pixels.pixels_mut().par_iter_mut().for_each(|px| {
            for (v, s) in px.iter_mut().zip(scale) {
                if *v != 0 {
                    *v = ((*v as f32 * s) as i32).clamp(0, 65535) as u16;
                }
            }
        });
    }
}

/// Multipliers from the 8×8 neutral sample block, if every channel has signal.
fn white_sample_multipliers(frame: &RawFrame, black: &NormalizedBlack) -> Option<[f32; 4]> {
    let samples = frame.white_samples.as_ref()?;
    let mut sum = [0u64; 4];
    let mut count = [0u64; 4];
    for (row, line) in samples.iter().enumerate() {
        for (col, &value) in line.iter().enumerate() {
            let c = frame.cfa.color(row, col);
            let v = value as i64 - black.per_channel[c] as i64;
            if v > 0 {
                sum[c] += v as u64;
            }
            count[c] += 1;
        }
    }
    if sum.iter().any(|&s| s == 0) {
        return None;
    }
    let mut mul = [0.0f32; 4];
    for c in 0..4 {
        mul[c] = count[c] as f32 / sum[c] as f32;
    }
    Some(mul)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::color::black_level::normalize;
    use crate::image_pipeline::raw::types::fixtures::uniform_rggb;

    #[test]
    fn capture_multipliers_are_normalised_by_minimum() {
        let mut frame = uniform_rggb(4, 4, 0, [0; 4]);
        frame.wb_multipliers = [2.0, 1.0, 1.5, 0.0];
        frame.maximum = 65535;
        let black = normalize(&frame.black, &frame.cfa);
        let wb = WhiteBalance::compute(&frame, &black).unwrap();
        assert_eq!(wb.source, MultiplierSource::Capture);
        assert_eq!(wb.pre_mul, [2.0, 1.0, 1.5, 1.0]);
        assert_eq!(wb.scale_mul, [2.0, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn missing_red_falls_back_to_unity() {
        let mut frame = uniform_rggb(4, 4, 0, [0; 4]);
        frame.wb_multipliers = [0.0, 1.0, 1.5, 1.0];
        let black = normalize(&frame.black, &frame.cfa);
        let wb = WhiteBalance::compute(&frame, &black).unwrap();
        assert_eq!(wb.source, MultiplierSource::Unity);
        assert_eq!(wb.pre_mul, [1.0; 4]);
    }

    #[test]
    fn range_expansion_uses_black_level() {
        let mut frame = uniform_rggb(4, 4, 0, [1023; 4]);
        frame.maximum = 4095 + 1023 - 3072;
        frame.wb_multipliers = [1.0; 4];
        let black = normalize(&frame.black, &frame.cfa);
        let wb = WhiteBalance::compute(&frame, &black).unwrap();
        let expected = 65535.0 / 1023.0;
        assert!((wb.scale_mul[0] - expected).abs() < 1e-3);
    }

    #[test]
    fn white_samples_take_priority() {
        let mut frame = uniform_rggb(8, 8, 0, [0; 4]);
        let mut block = [[0u16; 8]; 8];
        for (row, line) in block.iter_mut().enumerate() {
            for (col, v) in line.iter_mut().enumerate() {
                *v = match frame.cfa.color(row, col) {
                    0 => 200,
                    2 => 400,
                    _ => 100,
                };
            }
        }
        frame.white_samples = Some(block);
        let black = normalize(&frame.black, &frame.cfa);
        let wb = WhiteBalance::compute(&frame, &black).unwrap();
        assert_eq!(wb.source, MultiplierSource::WhiteSamples);
        assert_eq!(wb.pre_mul, [2.0, 4.0, 1.0, 4.0]);
    }

    #[test]
    fn apply_clips_to_sixteen_bits() {
        let mut buffer = SparseColorBuffer::new(1, 1).unwrap();
        buffer.pixels[(0, 0)] = [40000, 1000, 0, 0];
        let wb = WhiteBalance {
            source: MultiplierSource::Unity,
            pre_mul: [2.0, 1.0, 1.0, 1.0],
            scale_mul: [2.0, 1.5, 1.0, 1.0],
        };
        wb.apply(&mut buffer);
        assert_eq!(buffer.pixels[(0, 0)], [65535, 1500, 0, 0]);
    }

    #[test]
    fn saturated_black_is_a_stage_failure() {
        let mut frame = uniform_rggb(2, 2, 0, [5000; 4]);
        frame.maximum = 4095;
        let black = normalize(&frame.black, &frame.cfa);
        assert!(matches!(
            WhiteBalance::compute(&frame, &black),
            Err(PipelineError::StageComputeFailure { .. })
        ));
    }
}
