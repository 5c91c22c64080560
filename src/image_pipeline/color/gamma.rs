//! Tone curves
//!
//! A curve is a power law with a linear toe. Given the exponent and the toe
//! slope, [`GammaParams::solve`] finds by bisection the point where the two
//! segments meet with matching value and derivative.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::buffer::try_alloc;
use crate::image_pipeline::common::{Result, RgbBuffer16};

pub const CURVE_SIZE: usize = 0x10000;

/// White point that maps the full 16-bit range onto the curve.
pub const FULL_RANGE_WHITE: u32 = 0x10000;

const BISECTION_STEPS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ToneCurve {
    Linear,
    #[default]
    Srgb,
    Bt709,
    Custom { power: f64, toe_slope: f64 },
}

impl ToneCurve {
    /// `(power, toe_slope)` for this preset.
    pub fn coefficients(self) -> (f64, f64) {
        match self {
            ToneCurve::Linear => (1.0, 1.0),
            ToneCurve::Srgb => (1.0 / 2.4, 12.92),
            ToneCurve::Bt709 => (0.45, 4.5),
            ToneCurve::Custom { power, toe_slope } => (power, toe_slope),
        }
    }

    pub fn params(self) -> GammaParams {
        let (power, toe_slope) = self.coefficients();
        GammaParams::solve(power, toe_slope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveDirection {
    /// Linear light to tone-mapped output.
    Forward,
    /// Tone-mapped input back to linear light.
    Inverse,
}

/// Solved curve parameters:
/// `[power, toe_slope, toe_end_out, toe_end_in, offset, area_gain]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaParams {
    pub g: [f64; 6],
}

impl GammaParams {
    pub fn solve(power: f64, toe_slope: f64) -> Self {
        let mut g = [power, toe_slope, 0.0, 0.0, 0.0, 0.0];
        let mut bnd = [0.0f64, 0.0];
        bnd[(g[1] >= 1.0) as usize] = 1.0;

        if g[1] != 0.0 && (g[1] - 1.0) * (g[0] - 1.0) <= 0.0 {
            for _ in 0..BISECTION_STEPS {
                g[2] = (bnd[0] + bnd[1]) / 2.0;
                let upper = if g[0] != 0.0 {
                    ((g[2] / g[1]).powf(-g[0]) - 1.0) / g[0] - 1.0 / g[2] > -1.0
                } else {
                    g[2] / (1.0 - 1.0 / g[2]).exp() < g[1]
                };
                bnd[upper as usize] = g[2];
            }
            g[3] = g[2] / g[1];
            if g[0] != 0.0 {
                g[4] = g[2] * (1.0 / g[0] - 1.0);
            }
        }

        g[5] = if g[0] != 0.0 {
            1.0 / (g[1] * g[3] * g[3] / 2.0 - g[4] * (1.0 - g[3])
                + (1.0 - g[3].powf(1.0 + g[0])) * (1.0 + g[4]) / (1.0 + g[0]))
                - 1.0
        } else {
            1.0 / (g[1] * g[3] * g[3] / 2.0 + 1.0 - g[2] - g[3]
                - g[2] * g[3] * (g[3].ln() - 1.0))
                - 1.0
        };

        Self { g }
    }

    /// Evaluates the curve at normalised input `r` in `[0, 1)`.
    #[inline]
    pub fn eval(&self, r: f64, direction: CurveDirection) -> f64 {
        let g = &self.g;
        match direction {
            CurveDirection::Forward => {
                if r < g[3] {
                    r * g[1]
                } else if g[0] != 0.0 {
                    r.powf(g[0]) * (1.0 + g[4]) - g[4]
                } else {
                    r.ln() * g[2] + 1.0
                }
            }
            CurveDirection::Inverse => {
                if r < g[2] {
                    r / g[1]
                } else if g[0] != 0.0 {
                    ((r + g[4]) / (1.0 + g[4])).powf(1.0 / g[0])
                } else {
                    ((r - 1.0) / g[2]).exp()
                }
            }
        }
    }
}

/// Fully evaluated 16-bit lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct GammaCurve {
    params: GammaParams,
    table: Vec<u16>,
}

impl GammaCurve {
    /// Tabulates `params` for inputs scaled so that `white` maps to full output.
    pub fn build(params: GammaParams, direction: CurveDirection, white: u32) -> Result<Self> {
        let mut table = try_alloc(CURVE_SIZE, u16::MAX, "gamma curve")?;
        let white = white.max(1) as f64;
        table.par_iter_mut().enumerate().for_each(|(i, out)| {
            let r = i as f64 / white;
            if r < 1.0 {
                let v = 65536.0 * params.eval(r, direction);
                *out = v.clamp(0.0, 65535.0) as u16;
            }
        });
        Ok(Self { params, table })
    }

    /// Curve that leaves every value unchanged.
    pub fn identity() -> Result<Self> {
        Self::build(ToneCurve::Linear.params(), CurveDirection::Forward, FULL_RANGE_WHITE)
    }

    pub fn params(&self) -> &GammaParams {
        &self.params
    }

    pub fn table(&self) -> &[u16] {
        &self.table
    }

    #[inline]
    pub fn map(&self, value: u16) -> u16 {
        self.table[value as usize]
    }

    pub fn apply(&self, image: &mut RgbBuffer16) {
        image.pixels_mut().par_iter_mut().for_each(|px| {
            for v in px.iter_mut() {
                *v = self.map(*v);
            }
        });
    }
}
