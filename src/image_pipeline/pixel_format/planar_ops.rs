//! Operations on planar `f32` buffers

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::{PipelineError, PlanarBuffer, Result};
use crate::image_pipeline::common::buffer::try_alloc;
use crate::image_pipeline::state::Stage;

/// Rotates by `turns` multiples of 90° counter-clockwise.
pub fn rotate_quarter_turns(src: &PlanarBuffer, turns: u8) -> Result<PlanarBuffer> {
    let w = src.width();
    let h = src.height();
    let turns = turns % 4;
    if turns == 0 {
        return Ok(src.clone());
    }
    let (out_w, out_h) = if turns % 2 == 1 { (h, w) } else { (w, h) };

    let mut planes: [Vec<f32>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for (p, out) in planes.iter_mut().enumerate() {
        let input = src.plane(p);
        let mut plane = try_alloc(w * h, 0.0f32, "rotated plane")?;
        plane
            .par_chunks_mut(out_w.max(1))
            .enumerate()
            .for_each(|(r, line)| {
                for (c, v) in line.iter_mut().enumerate() {
                    // Source coordinates of output pixel (r, c).
                    let (sr, sc) = match turns {
                        1 => (c, w - 1 - r),
                        2 => (h - 1 - r, w - 1 - c),
                        _ => (h - 1 - c, r),
                    };
                    *v = input[sr * w + sc];
                }
            });
        *out = plane;
    }
    PlanarBuffer::from_planes(out_w, out_h, planes)
}

/// 3×3 convolution with edge samples replicated. `kernel` is row-major.
pub fn convolve3x3(src: &PlanarBuffer, kernel: &[f32; 9]) -> Result<PlanarBuffer> {
    let w = src.width();
    let h = src.height();
    let mut out = PlanarBuffer::new(w, h)?;
    if w == 0 || h == 0 {
        return Ok(out);
    }

    for p in 0..3 {
        let input = src.plane(p);
        out.plane_mut(p)
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(row, line)| {
                for (col, v) in line.iter_mut().enumerate() {
                    let mut acc = 0.0;
                    for (k, weight) in kernel.iter().enumerate() {
                        let r = (row as isize + k as isize / 3 - 1).clamp(0, h as isize - 1) as usize;
                        let c = (col as isize + k as isize % 3 - 1).clamp(0, w as isize - 1) as usize;
                        acc += weight * input[r * w + c];
                    }
                    *v = acc;
                }
            });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Morphology {
    Erode,
    Dilate,
}

/// Minimum (erode) or maximum (dilate) over a `(2 * radius + 1)²` square.
pub fn morphology(buffer: &mut PlanarBuffer, op: Morphology, radius: usize) -> Result<()> {
    let w = buffer.width();
    let h = buffer.height();
    if radius == 0 || w == 0 || h == 0 {
        return Ok(());
    }
    let pick: fn(f32, f32) -> f32 = match op {
        Morphology::Erode => f32::min,
        Morphology::Dilate => f32::max,
    };

    for plane in buffer.planes_mut().iter_mut() {
        // The square window separates into a row pass and a column pass.
        let mut horizontal = try_alloc(w * h, 0.0f32, "morphology scratch")?;
        horizontal
            .par_chunks_mut(w)
            .zip(plane.par_chunks(w))
            .for_each(|(out, line)| {
                for (col, v) in out.iter_mut().enumerate() {
                    let lo = col.saturating_sub(radius);
                    let hi = (col + radius).min(w - 1);
                    *v = line[lo..=hi].iter().copied().reduce(pick).unwrap_or(line[col]);
                }
            });

        plane.par_chunks_mut(w).enumerate().for_each(|(row, out)| {
            let lo = row.saturating_sub(radius);
            let hi = (row + radius).min(h - 1);
            for (col, v) in out.iter_mut().enumerate() {
                *v = (lo..=hi)
                    .map(|r| horizontal[r * w + col])
                    .reduce(pick)
                    .unwrap_or(*v);
            }
        });
    }
    Ok(())
}

/// Maps `[min, max]` linearly onto `[0, 1]`, clipping outside values.
pub fn contrast_stretch(buffer: &mut PlanarBuffer, min: f32, max: f32) -> Result<()> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(PipelineError::stage(
            Stage::HistogramModification,
            format!("invalid stretch bounds [{min}, {max}]"),
        ));
    }
    let scale = 1.0 / (max - min);
    for plane in buffer.planes_mut().iter_mut() {
        plane
            .par_iter_mut()
            .for_each(|v| *v = ((*v - min) * scale).clamp(0.0, 1.0));
    }
    Ok(())
}
