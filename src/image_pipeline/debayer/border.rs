//! Neighbour-average interpolation for edges

use crate::image_pipeline::common::SparseColorBuffer;
use crate::image_pipeline::raw::CfaPattern;

/// Fills the missing slots of every pixel within `border` of an edge with the
/// mean of the same-colour samples in its 3×3 neighbourhood.
///
/// A `border` of at least half the smaller dimension covers the whole frame,
/// which is how layouts without a dedicated demosaicer are reconstructed.
pub fn border_interpolate(buffer: &mut SparseColorBuffer, cfa: &CfaPattern, border: usize) {
    let width = buffer.width();
    let height = buffer.height();
    let colors = buffer.colors;

    for row in 0..height {
        let interior_row = row >= border && row + border < height;
        let mut col = 0;
        while col < width {
            if interior_row && col == border && width > 2 * border {
                col = width - border;
                continue;
            }

            let mut sum = [0u32; 4];
            let mut count = [0u32; 4];
            for y in row.saturating_sub(1)..(row + 2).min(height) {
                for x in col.saturating_sub(1)..(col + 2).min(width) {
                    let f = cfa.color(y, x);
                    sum[f] += buffer.pixels[(y, x)][f] as u32;
                    count[f] += 1;
                }
            }

            let own = cfa.color(row, col);
            let px = &mut buffer.pixels[(row, col)];
            for c in 0..colors {
                if c != own && count[c] > 0 {
                    px[c] = (sum[c] / count[c]) as u16;
                }
            }
            col += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mosaic(width: usize, height: usize, cfa: &CfaPattern, values: [u16; 4]) -> SparseColorBuffer {
        let mut buffer = SparseColorBuffer::new(width, height).unwrap();
        buffer.colors = 3;
        for row in 0..height {
            for col in 0..width {
                let c = cfa.color(row, col);
                buffer.pixels[(row, col)][c] = values[c];
            }
        }
        buffer
    }

    #[test]
    fn border_pixels_get_all_channels() {
        let cfa = CfaPattern::rggb().merge_greens();
        let mut buffer = mosaic(8, 8, &cfa, [100, 200, 300, 0]);
        border_interpolate(&mut buffer, &cfa, 2);
        for row in 0..8 {
            for col in 0..8 {
                let px = buffer.pixels[(row, col)];
                let edge = row < 2 || row >= 6 || col < 2 || col >= 6;
                if edge {
                    assert_eq!(&px[..3], &[100, 200, 300], "({row}, {col})");
                } else {
                    let filled = px[..3].iter().filter(|&&v| v != 0).count();
                    assert_eq!(filled, 1, "interior ({row}, {col}) touched");
                }
            }
        }
    }

    #[test]
    fn large_border_covers_everything() {
        let cfa = CfaPattern::grbg().merge_greens();
        let mut buffer = mosaic(5, 3, &cfa, [10, 20, 30, 0]);
        border_interpolate(&mut buffer, &cfa, usize::MAX / 2);
        assert!(buffer.pixels.pixels().iter().all(|px| px[..3] == [10, 20, 30]));
    }
}
