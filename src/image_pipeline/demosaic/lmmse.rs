//! Directional linear minimum mean square-error interpolation
//!
//! Green is reconstructed from green-minus-colour differences. Each
//! direction yields a noisy difference (Hamilton-Adams estimate) and a
//! Gaussian-smoothed one; an LMMSE update over a 9-sample window along that
//! direction refines it, and the two directions are fused with weights
//! inversely proportional to their residual variances. Red and blue then
//! follow by colour-difference interpolation against the full green plane.
//!
//! Reads past an edge mirror back into the frame, which keeps the CFA
//! parity of every neighbour.

use std::sync::LazyLock;

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::image_pipeline::color::ColorMatrix;
use crate::image_pipeline::common::{CancellationToken, PipelineError, Result, SparseColorBuffer};
use crate::image_pipeline::demosaic::Demosaicer;
use crate::image_pipeline::raw::CfaPattern;

const RADIUS: isize = 4;
const EPS: f32 = 1e-5;

pub const MIN_SIDE: usize = 2 * RADIUS as usize + 1;

/// Normalised `exp(-k²/8)` weights for `k = -4..=4`.
static GAUSS: LazyLock<[f32; 9]> = LazyLock::new(|| {
    let mut w = [0.0f32; 9];
    for (i, v) in w.iter_mut().enumerate() {
        let k = i as f32 - RADIUS as f32;
        *v = (-k * k / 8.0).exp();
    }
    let sum: f32 = w.iter().sum();
    w.map(|v| v / sum)
});

#[inline]
fn mirror(i: isize, n: usize) -> usize {
    let n = n as isize;
    let m = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    m.clamp(0, n - 1) as usize
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

struct Planes<'a> {
    width: usize,
    height: usize,
    cfa: &'a CfaPattern,
}

impl Planes<'_> {
    #[inline]
    fn idx(&self, row: usize, col: usize, axis: Axis, k: isize) -> usize {
        match axis {
            Axis::Horizontal => row * self.width + mirror(col as isize + k, self.width),
            Axis::Vertical => mirror(row as isize + k, self.height) * self.width + col,
        }
    }

    /// Per-row map of `f(row, col)` into a fresh plane.
    fn map_rows<F>(&self, f: F) -> Vec<f32>
    where
        F: Fn(usize, usize) -> f32 + Sync,
    {
        let mut out = vec![0.0f32; self.width * self.height];
        out.par_chunks_mut(self.width)
            .enumerate()
            .for_each(|(row, line)| {
                for (col, v) in line.iter_mut().enumerate() {
                    *v = f(row, col);
                }
            });
        out
    }

    /// Noisy green-minus-colour difference along `axis`.
    fn difference(&self, mosaic: &[f32], axis: Axis) -> Vec<f32> {
        self.map_rows(|row, col| {
            let at = |k| mosaic[self.idx(row, col, axis, k)];
            let estimate = (at(-1) + at(1)) * 0.5 + (2.0 * at(0) - at(-2) - at(2)) * 0.25;
            if self.cfa.color(row, col) == 1 {
                at(0) - estimate
            } else {
                estimate - at(0)
            }
        })
    }

    fn smooth(&self, diff: &[f32], axis: Axis) -> Vec<f32> {
        let gauss = &*GAUSS;
        self.map_rows(|row, col| {
            (-RADIUS..=RADIUS)
                .zip(gauss.iter())
                .map(|(k, w)| w * diff[self.idx(row, col, axis, k)])
                .sum()
        })
    }

    /// LMMSE refinement of one direction at one site: `(estimate, variance)`.
    fn estimate(&self, diff: &[f32], smooth: &[f32], row: usize, col: usize, axis: Axis) -> (f32, f32) {
        let mut mean = 0.0f32;
        for k in -RADIUS..=RADIUS {
            mean += smooth[self.idx(row, col, axis, k)];
        }
        mean /= 9.0;

        let mut signal = 0.0f32;
        let mut noise = 0.0f32;
        for k in -RADIUS..=RADIUS {
            let i = self.idx(row, col, axis, k);
            signal += (smooth[i] - mean).powi(2);
            noise += (diff[i] - smooth[i]).powi(2);
        }
        let p = signal / 9.0 + EPS;
        let r = noise / 9.0 + EPS;

        let i = row * self.width + col;
        let gain = p / (p + r);
        (mean + gain * (diff[i] - mean), p * r / (p + r))
    }
}

pub struct LmmseDemosaicer;

impl Demosaicer for LmmseDemosaicer {
    fn name(&self) -> &'static str {
        "lmmse"
    }

    #[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
    fn demosaic(
        &self,
        mut buffer: SparseColorBuffer,
        cfa: &CfaPattern,
        _cam_to_xyz: &ColorMatrix,
        cancel: &CancellationToken,
    ) -> Result<SparseColorBuffer> {
        let width = buffer.width();
        let height = buffer.height();
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(PipelineError::InvalidDimensions(width, height));
        }
        let checkpoint = || {
            if cancel.is_cancelled() {
                Err(PipelineError::Cancelled)
            } else {
                Ok(())
            }
        };

        let planes = Planes { width, height, cfa };
        let mosaic = planes.map_rows(|row, col| {
            buffer.pixels[(row, col)][cfa.color(row, col)] as f32
        });

        let dh = planes.difference(&mosaic, Axis::Horizontal);
        let dv = planes.difference(&mosaic, Axis::Vertical);
        let fh = planes.smooth(&dh, Axis::Horizontal);
        let fv = planes.smooth(&dv, Axis::Vertical);
        checkpoint()?;

        let green = planes.map_rows(|row, col| {
            let i = row * width + col;
            if cfa.color(row, col) == 1 {
                return mosaic[i];
            }
            let (eh, vh) = planes.estimate(&dh, &fh, row, col, Axis::Horizontal);
            let (ev, vv) = planes.estimate(&dv, &fv, row, col, Axis::Vertical);
            let d = (eh * vv + ev * vh) / (vh + vv);
            mosaic[i] + d
        });
        checkpoint()?;
        debug!("LMMSE green plane complete");

        // Green minus colour where the colour is known.
        let known = |row: usize, col: usize, c: usize| -> Option<f32> {
            (cfa.color(row, col) == c).then(|| {
                let i = row * width + col;
                green[i] - mosaic[i]
            })
        };

        // Red at blue sites and blue at red sites from the four diagonals.
        let mut diff_rb: [Vec<f32>; 2] = [0, 2].map(|c| {
            planes.map_rows(|row, col| {
                if let Some(d) = known(row, col, c) {
                    return d;
                }
                if cfa.color(row, col) == 1 {
                    return 0.0;
                }
                let mut sum = 0.0;
                for (dr, dc) in [(-1, -1), (-1, 1), (1, -1), (1, 1)] {
                    let r = mirror(row as isize + dr, height);
                    let c2 = mirror(col as isize + dc, width);
                    sum += green[r * width + c2] - mosaic[r * width + c2];
                }
                sum * 0.25
            })
        });
        checkpoint()?;

        // Both colours at green sites from the four direct neighbours.
        for plane in diff_rb.iter_mut() {
            let filled = plane.clone();
            plane
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(row, line)| {
                    for (col, v) in line.iter_mut().enumerate() {
                        if cfa.color(row, col) != 1 {
                            continue;
                        }
                        let mut sum = 0.0;
                        for (dr, dc) in [(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
                            let r = mirror(row as isize + dr, height);
                            let cc = mirror(col as isize + dc, width);
                            sum += filled[r * width + cc];
                        }
                        *v = sum * 0.25;
                    }
                });
        }

        let clip = |v: f32| v.round().clamp(0.0, 65535.0) as u16;
        buffer.pixels.par_rows_mut().for_each(|(row, line)| {
            for (col, px) in line.iter_mut().enumerate() {
                let i = row * width + col;
                let own = cfa.color(row, col);
                let g = green[i];
                px[0] = clip(g - diff_rb[0][i]);
                px[1] = clip(g);
                px[2] = clip(g - diff_rb[1][i]);
                px[own] = mosaic[i] as u16;
            }
        });

        buffer.colors = 3;
        Ok(buffer)
    }
}
