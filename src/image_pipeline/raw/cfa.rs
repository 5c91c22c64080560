//! Colour filter array patterns
//!
//! A pattern is identified by a 32-bit `filters` word. The value
//! [`FILTERS_TILE16`] selects a fixed 16×16 table; every other accepted value
//! packs a 2-bit channel index for each site of an 8-row × 2-column cell.
//! Channel 3 names the second green of a four-colour Bayer layout.

use crate::image_pipeline::common::error::{PipelineError, Result};

/// Pattern id of sensors whose layout repeats on a 16×16 tile.
pub const FILTERS_TILE16: u32 = 1;
/// Pattern id of 6×6 X-Trans sensors, which this pipeline does not handle.
pub const FILTERS_XTRANS: u32 = 9;

const TILE16: [[u8; 16]; 16] = [
    [2, 1, 1, 3, 2, 3, 2, 0, 3, 2, 3, 0, 1, 2, 1, 0],
    [0, 3, 0, 2, 0, 1, 3, 1, 0, 1, 1, 2, 0, 3, 3, 2],
    [2, 3, 3, 2, 3, 1, 1, 3, 3, 1, 2, 1, 2, 0, 0, 3],
    [0, 1, 0, 1, 0, 2, 0, 2, 2, 0, 3, 0, 1, 3, 2, 1],
    [3, 1, 1, 2, 0, 1, 0, 2, 1, 3, 1, 3, 0, 1, 3, 0],
    [2, 0, 0, 3, 3, 2, 3, 1, 2, 0, 2, 0, 3, 2, 2, 1],
    [2, 3, 3, 1, 2, 1, 2, 1, 2, 1, 1, 2, 3, 0, 0, 1],
    [1, 0, 0, 2, 3, 0, 0, 3, 0, 3, 0, 3, 2, 1, 2, 3],
    [2, 3, 3, 1, 1, 2, 1, 0, 3, 2, 3, 0, 2, 3, 1, 3],
    [1, 0, 2, 0, 3, 0, 3, 2, 0, 1, 1, 2, 0, 1, 0, 2],
    [0, 1, 1, 3, 3, 2, 2, 1, 1, 3, 3, 0, 2, 1, 3, 2],
    [2, 3, 2, 0, 0, 1, 3, 0, 2, 0, 1, 2, 3, 0, 1, 0],
    [1, 3, 1, 2, 3, 2, 3, 2, 0, 2, 0, 1, 1, 0, 3, 0],
    [0, 2, 0, 3, 1, 0, 0, 1, 1, 3, 3, 2, 3, 2, 2, 1],
    [2, 1, 3, 2, 3, 1, 2, 1, 0, 3, 0, 2, 0, 2, 0, 2],
    [0, 3, 1, 0, 0, 2, 0, 3, 2, 1, 3, 1, 1, 3, 1, 3],
];

/// CFA pattern in active-area coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaPattern {
    /// 2-bit-per-site mask repeating every 8 rows and 2 columns.
    Bayer { filters: u32 },
    /// 16×16 table, offset by the active area's position on the sensor.
    Tile16 { top_margin: usize, left_margin: usize },
}

impl CfaPattern {
    /// Builds a pattern from its id.
    pub fn from_filters(filters: u32, top_margin: usize, left_margin: usize) -> Result<Self> {
        match filters {
            0 => Err(PipelineError::UnsupportedSensorPattern(
                "sensor has no colour filter array".to_string(),
            )),
            FILTERS_TILE16 => Ok(Self::Tile16 {
                top_margin,
                left_margin,
            }),
            FILTERS_XTRANS => Err(PipelineError::UnsupportedSensorPattern(
                "X-Trans (6x6) sensors are not supported".to_string(),
            )),
            _ => {
                let pattern = Self::Bayer { filters };
                let mut seen = [false; 4];
                for row in 0..8 {
                    for col in 0..2 {
                        seen[pattern.color3(row, col)] = true;
                    }
                }
                if seen[0] && seen[1] && seen[2] {
                    Ok(pattern)
                } else {
                    Err(PipelineError::UnsupportedSensorPattern(format!(
                        "filters {filters:#010x} lacks a red, green or blue site"
                    )))
                }
            }
        }
    }

    /// Builds a Bayer mask from a 2×2 cell given row-major as channel indices.
    pub fn from_2x2(cell: [usize; 4]) -> Self {
        let mut filters = 0u32;
        for row in 0..8usize {
            for col in 0..2usize {
                let c = (cell[(row & 1) * 2 + (col & 1)] & 3) as u32;
                filters |= c << ((((row << 1) & 14) + (col & 1)) << 1);
            }
        }
        Self::Bayer { filters }
    }

    /// RGGB with the second green (on the blue row) as channel 3.
    pub fn rggb() -> Self {
        Self::from_2x2([0, 1, 3, 2])
    }

    pub fn bggr() -> Self {
        Self::from_2x2([2, 3, 1, 0])
    }

    pub fn grbg() -> Self {
        Self::from_2x2([1, 0, 2, 3])
    }

    pub fn gbrg() -> Self {
        Self::from_2x2([3, 2, 0, 1])
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Bayer { filters } => *filters,
            Self::Tile16 { .. } => FILTERS_TILE16,
        }
    }

    pub fn is_bayer(&self) -> bool {
        matches!(self, Self::Bayer { .. })
    }

    /// Channel slot (0..=3) sampled at `(row, col)`.
    #[inline]
    pub fn color(&self, row: usize, col: usize) -> usize {
        match *self {
            Self::Bayer { filters } => {
                ((filters >> ((((row << 1) & 14) + (col & 1)) << 1)) & 3) as usize
            }
            Self::Tile16 {
                top_margin,
                left_margin,
            } => TILE16[(row + top_margin) & 15][(col + left_margin) & 15] as usize,
        }
    }

    /// Like [`color`](Self::color) but with the second green folded onto green.
    #[inline]
    pub fn color3(&self, row: usize, col: usize) -> usize {
        match self.color(row, col) {
            3 => 1,
            c => c,
        }
    }

    /// Pattern with every channel-3 site relabelled as channel 1.
    pub fn merge_greens(&self) -> Self {
        match *self {
            Self::Bayer { filters } => Self::Bayer {
                filters: filters & !((filters & 0x5555_5555) << 1),
            },
            tile => tile,
        }
    }

    /// The 2×2 cell (greens merged) when the pattern is a plain Bayer layout.
    pub fn bayer_cell(&self) -> Option<[usize; 4]> {
        if !self.is_bayer() {
            return None;
        }
        let cell = [
            self.color3(0, 0),
            self.color3(0, 1),
            self.color3(1, 0),
            self.color3(1, 1),
        ];
        let periodic = (0..8).all(|row| {
            (0..2).all(|col| self.color3(row, col) == cell[(row & 1) * 2 + col])
        });
        periodic.then_some(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rggb_layout() {
        let cfa = CfaPattern::rggb();
        assert_eq!(cfa.color(0, 0), 0);
        assert_eq!(cfa.color(0, 1), 1);
        assert_eq!(cfa.color(1, 0), 3);
        assert_eq!(cfa.color(1, 1), 2);
        assert_eq!(cfa.color(6, 4), 0);
        assert_eq!(cfa.color(7, 5), 2);
        assert_eq!(cfa.color3(1, 0), 1);
    }

    #[test]
    fn merged_rggb_matches_three_colour_id() {
        assert_eq!(CfaPattern::rggb().id(), 0xB4B4_B4B4);
        assert_eq!(CfaPattern::rggb().merge_greens().id(), 0x9494_9494);
    }

    #[test]
    fn tile16_uses_margins() {
        let cfa = CfaPattern::from_filters(FILTERS_TILE16, 0, 0).unwrap();
        assert_eq!(cfa.color(0, 0), 2);
        assert_eq!(cfa.color(1, 1), 3);
        assert_eq!(cfa.color(16, 17), cfa.color(0, 1));

        let shifted = CfaPattern::from_filters(FILTERS_TILE16, 2, 3).unwrap();
        assert_eq!(shifted.color(0, 0), TILE16[2][3] as usize);
        assert!(shifted.bayer_cell().is_none());
    }

    #[test]
    fn rejects_unknown_patterns() {
        for filters in [0, FILTERS_XTRANS, 0x5555_5555] {
            assert!(matches!(
                CfaPattern::from_filters(filters, 0, 0),
                Err(PipelineError::UnsupportedSensorPattern(_))
            ));
        }
    }

    #[test]
    fn bayer_cell_for_all_orientations() {
        assert_eq!(CfaPattern::rggb().bayer_cell(), Some([0, 1, 1, 2]));
        assert_eq!(CfaPattern::bggr().bayer_cell(), Some([2, 1, 1, 0]));
        assert_eq!(CfaPattern::grbg().bayer_cell(), Some([1, 0, 2, 1]));
        assert_eq!(CfaPattern::gbrg().bayer_cell(), Some([1, 2, 0, 1]));
    }
}
