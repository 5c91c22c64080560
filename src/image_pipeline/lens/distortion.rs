use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::common::{Result, SparseColorBuffer};
use crate::image_pipeline::lens::{DistortionModel, Geometry};

/// Resamples the image so straight lines bent by `model` become straight.
///
/// Each output pixel reads the distorted position of its radius with
/// bilinear interpolation; reads past an edge clamp to it.
pub fn correct_distortion(buffer: &mut SparseColorBuffer, model: &DistortionModel) -> Result<()> {
    if model.is_identity() {
        return Ok(());
    }
    let width = buffer.width();
    let height = buffer.height();
    if width < 2 || height < 2 {
        return Ok(());
    }
    debug!("Correcting distortion a={} b={} c={}", model.a, model.b, model.c);

    let geometry = Geometry::new(width, height);
    let source = buffer.pixels.clone();
    let colors = buffer.colors;
    let sample = |y: f32, x: f32| -> [f32; 4] {
        let x = x.clamp(0.0, (width - 1) as f32);
        let y = y.clamp(0.0, (height - 1) as f32);
        let x0 = (x.floor() as usize).min(width - 2);
        let y0 = (y.floor() as usize).min(height - 2);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let mut out = [0.0f32; 4];
        for (c, v) in out.iter_mut().enumerate().take(colors) {
            let p00 = source[(y0, x0)][c] as f32;
            let p01 = source[(y0, x0 + 1)][c] as f32;
            let p10 = source[(y0 + 1, x0)][c] as f32;
            let p11 = source[(y0 + 1, x0 + 1)][c] as f32;
            let top = p00 + (p01 - p00) * fx;
            let bottom = p10 + (p11 - p10) * fx;
            *v = top + (bottom - top) * fy;
        }
        out
    };

    buffer.pixels.par_rows_mut().for_each(|(row, line)| {
        for (col, px) in line.iter_mut().enumerate() {
            let r = geometry.radius(row, col);
            let scale = if r > 0.0 { model.distort(r) / r } else { 1.0 };
            let x = geometry.cx + (col as f32 - geometry.cx) * scale;
            let y = geometry.cy + (row as f32 - geometry.cy) * scale;
            let value = sample(y, x);
            for c in 0..colors {
                px[c] = value[c].round().clamp(0.0, 65535.0) as u16;
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> SparseColorBuffer {
        let mut buffer = SparseColorBuffer::new(width, height).unwrap();
        buffer.colors = 3;
        for row in 0..height {
            for col in 0..width {
                let v = (100 * col + 10 * row) as u16;
                buffer.pixels[(row, col)] = [v, v, v, 0];
            }
        }
        buffer
    }

    #[test]
    fn identity_model_leaves_image_alone() {
        let mut buffer = gradient(6, 4);
        let before = buffer.clone();
        correct_distortion(&mut buffer, &DistortionModel { a: 0.0, b: 0.0, c: 0.0 }).unwrap();
        assert_eq!(buffer, before);
    }

    #[test]
    fn samples_move_towards_centre_when_distorted_radius_shrinks() {
        let mut buffer = gradient(9, 9);
        let before = buffer.clone();
        // r_d = r_u (0.2 r_u + 0.8) < r_u inside the frame
        let model = DistortionModel { a: 0.0, b: 0.0, c: 0.2 };
        correct_distortion(&mut buffer, &model).unwrap();
        assert_eq!(buffer.pixels[(4, 4)], before.pixels[(4, 4)]);
        assert!(buffer.pixels[(4, 8)][0] < before.pixels[(4, 8)][0]);
        assert!(buffer.pixels[(4, 0)][0] > before.pixels[(4, 0)][0]);
    }
}
