//! Post-interpolation clean-up

use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::common::SparseColorBuffer;
use crate::image_pipeline::raw::CfaPattern;

/// Comparator pairs of the optimal 9-element median network.
const MEDIAN_NETWORK: [(usize, usize); 19] = [
    (1, 2),
    (4, 5),
    (7, 8),
    (0, 1),
    (3, 4),
    (6, 7),
    (1, 2),
    (4, 5),
    (7, 8),
    (0, 3),
    (5, 8),
    (4, 7),
    (3, 6),
    (1, 4),
    (2, 5),
    (4, 7),
    (4, 2),
    (6, 4),
    (4, 2),
];

#[inline]
fn median9(mut v: [i32; 9]) -> i32 {
    for (a, b) in MEDIAN_NETWORK {
        if v[a] > v[b] {
            v.swap(a, b);
        }
    }
    v[4]
}

/// Records, in slot 3, the green the opposite lattice predicts for each
/// green site (mean of its four diagonal greens). Non-green sites copy slot 1.
///
/// `cfa` is the merged pattern the buffer was interpolated with.
pub fn split_green_lattices(buffer: &mut SparseColorBuffer, cfa: &CfaPattern) {
    let width = buffer.width();
    let height = buffer.height();
    let greens: Vec<u16> = buffer.pixels.pixels().iter().map(|px| px[1]).collect();

    buffer.pixels.par_rows_mut().for_each(|(row, line)| {
        for (col, px) in line.iter_mut().enumerate() {
            px[3] = px[1];
            if cfa.color(row, col) != 1 {
                continue;
            }
            let mut sum = 0u32;
            let mut count = 0u32;
            for (dr, dc) in [(-1isize, -1isize), (-1, 1), (1, -1), (1, 1)] {
                let r = row as isize + dr;
                let c = col as isize + dc;
                if r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width {
                    sum += greens[r as usize * width + c as usize] as u32;
                    count += 1;
                }
            }
            if count > 0 {
                px[3] = (sum / count) as u16;
            }
        }
    });
    buffer.colors = 4;
}

/// Averages the two green lattices into slot 1 and drops to three colours.
pub fn mix_green(buffer: &mut SparseColorBuffer) {
    if buffer.colors != 4 {
        return;
    }
    buffer.pixels.pixels_mut().par_iter_mut().for_each(|px| {
        let g = ((px[1] as u32 + px[3] as u32) / 2) as u16;
        px[1] = g;
        px[3] = g;
    });
    buffer.colors = 3;
}

/// Replaces red and blue by green plus the 3×3 median of their difference to
/// green, `passes` times. The outermost rows and columns are left alone.
pub fn median_filter(buffer: &mut SparseColorBuffer, passes: u32) {
    let width = buffer.width();
    let height = buffer.height();
    if width < 3 || height < 3 {
        return;
    }

    for pass in 1..=passes {
        for c in [0, 2] {
            let diff: Vec<i32> = buffer
                .pixels
                .pixels()
                .iter()
                .map(|px| px[c] as i32 - px[1] as i32)
                .collect();

            buffer.pixels.par_rows_mut().for_each(|(row, line)| {
                if row == 0 || row == height - 1 {
                    return;
                }
                for col in 1..width - 1 {
                    let mut window = [0i32; 9];
                    let mut k = 0;
                    for r in row - 1..=row + 1 {
                        for x in col - 1..=col + 1 {
                            window[k] = diff[r * width + x];
                            k += 1;
                        }
                    }
                    let px = &mut line[col];
                    px[c] = (median9(window) + px[1] as i32).clamp(0, 65535) as u16;
                }
            });
        }
        debug!("Median filter pass {} complete", pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_network_sorts_middle() {
        let samples = [
            [9, 8, 7, 6, 5, 4, 3, 2, 1],
            [1, 1, 1, 100, 100, 100, 0, 0, 0],
            [5, 3, 9, 1, 7, 2, 8, 6, 4],
        ];
        for s in samples {
            let mut sorted = s;
            sorted.sort();
            assert_eq!(median9(s), sorted[4], "{s:?}");
        }
    }

    #[test]
    fn mix_green_averages_lattices() {
        let mut buffer = SparseColorBuffer::new(1, 2).unwrap();
        buffer.pixels[(0, 0)] = [0, 100, 0, 200];
        buffer.pixels[(1, 0)] = [0, 7, 0, 8];
        mix_green(&mut buffer);
        assert_eq!(buffer.colors, 3);
        assert_eq!(buffer.pixels[(0, 0)][1], 150);
        assert_eq!(buffer.pixels[(1, 0)][1], 7);

        buffer.pixels[(0, 0)][3] = 0;
        mix_green(&mut buffer);
        assert_eq!(buffer.pixels[(0, 0)][1], 150);
    }

    #[test]
    fn split_then_mix_preserves_flat_green() {
        let cfa = CfaPattern::rggb().merge_greens();
        let mut buffer = SparseColorBuffer::new(6, 6).unwrap();
        for px in buffer.pixels.pixels_mut() {
            *px = [10, 500, 30, 0];
        }
        buffer.colors = 3;
        split_green_lattices(&mut buffer, &cfa);
        assert_eq!(buffer.colors, 4);
        mix_green(&mut buffer);
        assert!(buffer.pixels.pixels().iter().all(|px| px[1] == 500));
    }

    #[test]
    fn median_removes_isolated_fringe() {
        let mut buffer = SparseColorBuffer::new(5, 5).unwrap();
        buffer.colors = 3;
        for px in buffer.pixels.pixels_mut() {
            *px = [1000, 1000, 1000, 0];
        }
        buffer.pixels[(2, 2)][0] = 9000;
        median_filter(&mut buffer, 1);
        assert_eq!(buffer.pixels[(2, 2)][0], 1000);

        buffer.pixels[(0, 0)][2] = 7;
        median_filter(&mut buffer, 2);
        assert_eq!(buffer.pixels[(0, 0)][2], 7);
    }
}
