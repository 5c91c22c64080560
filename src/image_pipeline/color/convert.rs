//! Camera to working-space conversion

use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::color::histogram::Histogram;
use crate::image_pipeline::color::matrix::ColorMatrix;
use crate::image_pipeline::common::{Result, RgbBuffer16, SparseColorBuffer};

#[inline]
fn clip(v: f32) -> u16 {
    (v as i32).clamp(0, 65535) as u16
}

/// Applies `matrix` to every pixel and tallies the clipped result.
///
/// A fourth channel the matrix has no column for is folded into green with
/// equal weight instead of being dropped.
pub fn convert_to_rgb(
    buffer: &SparseColorBuffer,
    matrix: &ColorMatrix,
) -> Result<(RgbBuffer16, Histogram)> {
    let fold_fourth = buffer.colors == 4 && !matrix.has_fourth_column();
    let use_fourth = buffer.colors == 4 && !fold_fourth;
    debug!(
        "Converting {}x{} ({} colours, fold fourth: {})",
        buffer.width(),
        buffer.height(),
        buffer.colors,
        fold_fourth
    );

    let mut out = RgbBuffer16::new(buffer.width(), buffer.height())?;
    let histogram = out
        .par_rows_mut()
        .fold(
            || Histogram::new(3),
            |mut histogram, (row, pixels)| {
                for (dst, src) in pixels.iter_mut().zip(buffer.pixels.row(row)) {
                    let mut px = src.map(f32::from);
                    if fold_fourth {
                        px[1] = (px[1] + px[3]) * 0.5;
                    }
                    if !use_fourth {
                        px[3] = 0.0;
                    }
                    let rgb = matrix.transform(px);
                    for (c, (d, v)) in dst.iter_mut().zip(rgb).enumerate() {
                        *d = clip(v);
                        histogram.add(c, *d);
                    }
                }
                histogram
            },
        )
        .reduce(|| Histogram::new(3), Histogram::merged);

    Ok((out, histogram))
}
