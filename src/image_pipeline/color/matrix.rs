//! Colour space matrices

use serde::{Deserialize, Serialize};

/// XYZ from linear sRGB (D65).
const XYZ_FROM_SRGB: [[f64; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

/// Linear sRGB from XYZ (D65).
const SRGB_FROM_XYZ: [[f64; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];

const ADOBE_FROM_SRGB: [[f64; 3]; 3] = [
    [0.715146, 0.284856, 0.000000],
    [0.000000, 1.000000, 0.000000],
    [0.000000, 0.041166, 0.958839],
];

const WIDE_FROM_SRGB: [[f64; 3]; 3] = [
    [0.593087, 0.404710, 0.002206],
    [0.095413, 0.843149, 0.061439],
    [0.011621, 0.069091, 0.919288],
];

const PROPHOTO_FROM_SRGB: [[f64; 3]; 3] = [
    [0.529317, 0.330092, 0.140588],
    [0.098368, 0.873465, 0.028169],
    [0.016879, 0.117663, 0.865457],
];

/// Reference white of the XYZ space the camera matrices target.
pub const D65_WHITE: [f32; 3] = [0.950456, 1.0, 1.088754];

/// 3×4 matrix mapping up to four input channels to three outputs.
///
/// The fourth column only matters for sensors with a real fourth colour; it
/// is zero for every pure 3×3 matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorMatrix {
    m: [[f32; 4]; 3],
}

impl ColorMatrix {
    pub const fn new(m: [[f32; 4]; 3]) -> Self {
        Self { m }
    }

    pub fn from_3x3(m: [[f64; 3]; 3]) -> Self {
        let mut out = [[0.0f32; 4]; 3];
        for (dst, src) in out.iter_mut().zip(m.iter()) {
            for c in 0..3 {
                dst[c] = src[c] as f32;
            }
        }
        Self { m: out }
    }

    pub fn identity() -> Self {
        Self::from_3x3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn srgb_to_xyz() -> Self {
        Self::from_3x3(XYZ_FROM_SRGB)
    }

    pub fn xyz_to_srgb() -> Self {
        Self::from_3x3(SRGB_FROM_XYZ)
    }

    pub fn rows(&self) -> &[[f32; 4]; 3] {
        &self.m
    }

    /// True when the fourth input channel contributes to the output.
    pub fn has_fourth_column(&self) -> bool {
        self.m.iter().any(|row| row[3] != 0.0)
    }

    /// `self × rhs`, treating `self` as 3×3 and `rhs` as 3×4.
    pub fn compose(&self, rhs: &ColorMatrix) -> ColorMatrix {
        let mut out = [[0.0f32; 4]; 3];
        for i in 0..3 {
            for j in 0..4 {
                out[i][j] = (0..3).map(|k| self.m[i][k] * rhs.m[k][j]).sum();
            }
        }
        ColorMatrix { m: out }
    }

    /// Divides each output row by the matching entry of `divisors`.
    pub fn scale_rows(&self, divisors: [f32; 3]) -> ColorMatrix {
        let mut out = self.m;
        for (row, d) in out.iter_mut().zip(divisors) {
            for v in row.iter_mut() {
                *v /= d;
            }
        }
        ColorMatrix { m: out }
    }

    #[inline]
    pub fn transform(&self, px: [f32; 4]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (o, row) in out.iter_mut().zip(self.m.iter()) {
            *o = row[0] * px[0] + row[1] * px[1] + row[2] * px[2] + row[3] * px[3];
        }
        out
    }
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// RGB space the pipeline works in after colour conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkingSpace {
    #[default]
    Srgb,
    AdobeRgb,
    WideGamut,
    ProPhoto,
}

impl WorkingSpace {
    /// Matrix taking linear sRGB into this space.
    pub fn from_srgb(self) -> ColorMatrix {
        match self {
            WorkingSpace::Srgb => ColorMatrix::identity(),
            WorkingSpace::AdobeRgb => ColorMatrix::from_3x3(ADOBE_FROM_SRGB),
            WorkingSpace::WideGamut => ColorMatrix::from_3x3(WIDE_FROM_SRGB),
            WorkingSpace::ProPhoto => ColorMatrix::from_3x3(PROPHOTO_FROM_SRGB),
        }
    }
}

/// Combined camera-native to working-space matrix.
pub fn camera_to_working(cam_to_xyz: &ColorMatrix, space: WorkingSpace) -> ColorMatrix {
    space
        .from_srgb()
        .compose(&ColorMatrix::xyz_to_srgb())
        .compose(cam_to_xyz)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &ColorMatrix, b: &ColorMatrix, eps: f32) {
        for (ra, rb) in a.rows().iter().zip(b.rows()) {
            for (x, y) in ra.iter().zip(rb) {
                assert!((x - y).abs() < eps, "{a:?} != {b:?}");
            }
        }
    }

    #[test]
    fn srgb_round_trip_is_near_identity() {
        let m = ColorMatrix::xyz_to_srgb().compose(&ColorMatrix::srgb_to_xyz());
        assert_close(&m, &ColorMatrix::identity(), 1e-3);
    }

    #[test]
    fn srgb_camera_maps_to_srgb_working_space() {
        let m = camera_to_working(&ColorMatrix::srgb_to_xyz(), WorkingSpace::Srgb);
        assert_close(&m, &ColorMatrix::identity(), 1e-3);
    }

    #[test]
    fn working_spaces_preserve_white() {
        for space in [
            WorkingSpace::AdobeRgb,
            WorkingSpace::WideGamut,
            WorkingSpace::ProPhoto,
        ] {
            let white = space.from_srgb().transform([1.0, 1.0, 1.0, 0.0]);
            for v in white {
                assert!((v - 1.0).abs() < 1e-3, "{space:?}: {white:?}");
            }
        }
    }

    #[test]
    fn fourth_column_detection() {
        let mut rows = [[0.0f32; 4]; 3];
        assert!(!ColorMatrix::new(rows).has_fourth_column());
        rows[1][3] = 0.5;
        let m = ColorMatrix::new(rows);
        assert!(m.has_fourth_column());
        assert_eq!(m.transform([0.0, 0.0, 0.0, 2.0]), [0.0, 1.0, 0.0]);
    }
}
