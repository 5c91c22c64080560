use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::common::SparseColorBuffer;
use crate::image_pipeline::lens::{Geometry, VignettingModel};

/// Divides out the light falloff of every model, clipping to 16 bits.
pub fn correct_vignetting(buffer: &mut SparseColorBuffer, models: &[VignettingModel]) {
    if models.is_empty() {
        return;
    }
    let geometry = Geometry::new(buffer.width(), buffer.height());
    let colors = buffer.colors;
    debug!("Correcting vignetting with {} model(s)", models.len());

    buffer.pixels.par_rows_mut().for_each(|(row, line)| {
        for (col, px) in line.iter_mut().enumerate() {
            let r = geometry.radius(row, col);
            let gain: f32 = models.iter().map(|m| m.gain(r)).product();
            if gain <= 0.0 {
                continue;
            }
            for v in px.iter_mut().take(colors) {
                *v = (*v as f32 / gain).round().clamp(0.0, 65535.0) as u16;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_is_untouched_and_corners_brighten() {
        let mut buffer = SparseColorBuffer::new(5, 5).unwrap();
        buffer.colors = 3;
        for px in buffer.pixels.pixels_mut() {
            *px = [1000, 1000, 1000, 0];
        }
        let model = VignettingModel { k1: -0.5, k2: 0.0, k3: 0.0 };
        correct_vignetting(&mut buffer, &[model]);

        assert_eq!(buffer.pixels[(2, 2)], [1000, 1000, 1000, 0]);
        // r² = 0.64 at the corners, gain 0.68
        assert_eq!(buffer.pixels[(0, 0)][..3], [1471, 1471, 1471]);
        assert_eq!(buffer.pixels[(0, 0)][3], 0);
    }

    #[test]
    fn no_models_is_a_no_op() {
        let mut buffer = SparseColorBuffer::new(3, 3).unwrap();
        buffer.pixels[(0, 0)] = [5, 6, 7, 0];
        let before = buffer.clone();
        correct_vignetting(&mut buffer, &[]);
        assert_eq!(buffer, before);
    }
}
