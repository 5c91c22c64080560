//! Mosaic to sparse four-slot buffer

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::image_pipeline::color::{NormalizedBlack, subtract_grid};
use crate::image_pipeline::common::{Result, SparseColorBuffer};
use crate::image_pipeline::raw::RawFrame;

/// Extraction result together with the largest black-subtracted sample.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub buffer: SparseColorBuffer,
    pub max: u16,
}

pub struct BayerExtractor;

impl BayerExtractor {
    /// Copies the active area of `frame` into a sparse buffer.
    ///
    /// Each site's sample lands in the slot the CFA pattern names, reduced by
    /// that slot's black level and floored at zero. Every other slot stays 0.
    #[instrument(skip_all, fields(width = frame.width, height = frame.height))]
    pub fn extract(frame: &RawFrame, black: &NormalizedBlack) -> Result<Extracted> {
        let mut buffer = SparseColorBuffer::new(frame.width, frame.height)?;
        buffer.colors = frame.colors;

        let cfa = frame.cfa;
        let levels = black.per_channel;
        let mut max = buffer
            .pixels
            .par_rows_mut()
            .map(|(row, pixels)| {
                let mut row_max = 0u16;
                for (col, px) in pixels.iter_mut().enumerate() {
                    let c = cfa.color(row, col);
                    let value = (frame.sample(row, col) as u32).saturating_sub(levels[c]) as u16;
                    px[c] = value;
                    row_max = row_max.max(value);
                }
                row_max
            })
            .max()
            .unwrap_or(0);

        if let Some(grid) = &black.grid {
            debug!("Subtracting {}x{} black level grid", grid.rows, grid.cols);
            max = subtract_grid(&mut buffer, grid);
        }

        debug!("Extracted mosaic, maximum sample {}", max);
        Ok(Extracted { buffer, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::color::normalize_black;
    use crate::image_pipeline::raw::types::fixtures::uniform_rggb;

    #[test]
    fn uniform_mosaic_fills_only_cfa_slots() {
        let frame = uniform_rggb(4, 4, 1000, [0; 4]);
        let black = normalize_black(&frame.black, &frame.cfa);
        let out = BayerExtractor::extract(&frame, &black).unwrap();
        assert_eq!(out.max, 1000);
        for row in 0..4 {
            for col in 0..4 {
                let c = frame.cfa.color(row, col);
                let px = out.buffer.pixels[(row, col)];
                for slot in 0..4 {
                    assert_eq!(px[slot], if slot == c { 1000 } else { 0 });
                }
            }
        }
    }

    #[test]
    fn black_level_is_subtracted_per_channel() {
        let frame = uniform_rggb(4, 4, 128, [64, 64, 64, 64]);
        let black = normalize_black(&frame.black, &frame.cfa);
        let out = BayerExtractor::extract(&frame, &black).unwrap();
        for row in 0..4 {
            for col in 0..4 {
                let c = frame.cfa.color(row, col);
                assert_eq!(out.buffer.pixels[(row, col)][c], 64);
            }
        }
        assert_eq!(out.max, 64);
    }

    #[test]
    fn samples_below_black_clamp_to_zero() {
        let mut frame = uniform_rggb(2, 2, 500, [0, 0, 600, 0]);
        frame.data[3] = 700;
        let black = normalize_black(&frame.black, &frame.cfa);
        let out = BayerExtractor::extract(&frame, &black).unwrap();
        assert_eq!(out.buffer.pixels[(0, 0)][0], 500);
        assert_eq!(out.buffer.pixels[(1, 1)][2], 100);
        assert_eq!(out.max, 500);
    }

    #[test]
    fn active_area_skips_margins() {
        let mut frame = uniform_rggb(6, 6, 0, [0; 4]);
        for (i, v) in frame.data.iter_mut().enumerate() {
            *v = i as u16;
        }
        frame.top_margin = 2;
        frame.left_margin = 2;
        frame.width = 4;
        frame.height = 4;
        let black = normalize_black(&frame.black, &frame.cfa);
        let out = BayerExtractor::extract(&frame, &black).unwrap();
        assert_eq!(out.buffer.width(), 4);
        assert_eq!(out.buffer.pixels[(0, 0)][0], 2 * 6 + 2);
        assert_eq!(out.max, 35);
    }
}
