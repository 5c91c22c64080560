//! Black level normalisation
//!
//! Decoders report black as up to three overlapping components: a scalar,
//! four per-channel values and an optional repeating grid. [`normalize`]
//! folds them into one full level per channel slot plus whatever part of the
//! grid cannot be expressed per channel.

use rayon::prelude::*;

use crate::image_pipeline::common::SparseColorBuffer;
use crate::image_pipeline::raw::{BlackGrid, BlackLevels, CfaPattern};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBlack {
    /// Component common to every channel.
    pub black: u32,
    /// Full level per channel slot, `black` included.
    pub per_channel: [u32; 4],
    /// Grid remainder still to subtract per site.
    pub grid: Option<BlackGrid>,
}

pub fn normalize(levels: &BlackLevels, cfa: &CfaPattern) -> NormalizedBlack {
    let mut per_channel = levels.per_channel;
    let mut black = levels.black;
    let mut grid = levels.grid.clone();

    // Small grids are really per-channel values.
    if let Some(g) = &grid {
        let fold_bayer = cfa.is_bayer() && (1..=2).contains(&g.rows) && (1..=2).contains(&g.cols);
        let fold_single = !cfa.is_bayer() && g.rows == 1 && g.cols == 1;
        if fold_bayer || fold_single {
            for (c, level) in per_channel.iter_mut().enumerate() {
                *level += g.at(c / 2, c % 2);
            }
            grid = None;
        }
    }

    let common = per_channel.iter().copied().min().unwrap_or(0);
    for level in per_channel.iter_mut() {
        *level -= common;
    }
    black += common;

    if let Some(g) = grid.as_mut() {
        let cells = g.rows * g.cols;
        let common = g.values[..cells].iter().copied().min().unwrap_or(0);
        for v in g.values[..cells].iter_mut() {
            *v -= common;
        }
        black += common;
        if g.values[..cells].iter().all(|&v| v == 0) {
            grid = None;
        }
    }

    for level in per_channel.iter_mut() {
        *level += black;
    }

    NormalizedBlack {
        black,
        per_channel,
        grid,
    }
}

/// Subtracts the per-site grid remainder in place and returns the new maximum.
pub fn subtract_grid(buffer: &mut SparseColorBuffer, grid: &BlackGrid) -> u16 {
    buffer
        .pixels
        .par_rows_mut()
        .map(|(row, pixels)| {
            let mut max = 0u16;
            for (col, px) in pixels.iter_mut().enumerate() {
                let level = grid.at(row, col);
                for v in px.iter_mut().filter(|v| **v != 0) {
                    *v = (*v as u32).saturating_sub(level) as u16;
                    max = max.max(*v);
                }
            }
            max
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(black: u32, per_channel: [u32; 4], grid: Option<BlackGrid>) -> BlackLevels {
        BlackLevels {
            black,
            per_channel,
            grid,
        }
    }

    #[test]
    fn common_part_moves_into_scalar() {
        let n = normalize(&levels(0, [64, 64, 64, 64], None), &CfaPattern::rggb());
        assert_eq!(n.black, 64);
        assert_eq!(n.per_channel, [64; 4]);
        assert!(n.grid.is_none());
    }

    #[test]
    fn uneven_channels_keep_their_remainder() {
        let n = normalize(&levels(10, [512, 510, 514, 510], None), &CfaPattern::rggb());
        assert_eq!(n.black, 520);
        assert_eq!(n.per_channel, [522, 520, 524, 520]);
    }

    #[test]
    fn two_by_two_grid_folds_into_channels() {
        let grid = BlackGrid {
            rows: 2,
            cols: 2,
            values: vec![1, 2, 3, 4],
        };
        let n = normalize(&levels(0, [100; 4], Some(grid)), &CfaPattern::rggb());
        assert!(n.grid.is_none());
        assert_eq!(n.black, 101);
        assert_eq!(n.per_channel, [101, 102, 103, 104]);
    }

    #[test]
    fn large_grid_keeps_residual() {
        let grid = BlackGrid {
            rows: 4,
            cols: 4,
            values: (0..16).map(|v| 8 + (v % 3)).collect(),
        };
        let n = normalize(&levels(0, [16; 4], Some(grid)), &CfaPattern::rggb());
        assert_eq!(n.black, 24);
        assert_eq!(n.per_channel, [24; 4]);
        let residual = n.grid.expect("non-uniform grid survives");
        assert_eq!(residual.values[..3], [0, 1, 2]);
    }

    #[test]
    fn uniform_large_grid_is_dropped() {
        let grid = BlackGrid {
            rows: 4,
            cols: 4,
            values: vec![5; 16],
        };
        let n = normalize(&levels(0, [0; 4], Some(grid)), &CfaPattern::rggb());
        assert!(n.grid.is_none());
        assert_eq!(n.per_channel, [5; 4]);
    }

    #[test]
    fn grid_subtraction_reports_new_maximum() {
        let mut buffer = SparseColorBuffer::new(2, 2).unwrap();
        buffer.pixels[(0, 0)][0] = 100;
        buffer.pixels[(1, 1)][2] = 50;
        let grid = BlackGrid {
            rows: 1,
            cols: 2,
            values: vec![10, 60],
        };
        assert_eq!(subtract_grid(&mut buffer, &grid), 90);
        assert_eq!(buffer.pixels[(1, 1)][2], 0);
    }
}
