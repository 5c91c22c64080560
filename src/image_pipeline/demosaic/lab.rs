//! Fixed-point CIELab used for homogeneity comparisons

use std::sync::LazyLock;

use crate::image_pipeline::color::{ColorMatrix, D65_WHITE};

/// Lab components are stored multiplied by this factor.
pub const LAB_SCALE: f32 = 64.0;

static CBRT: LazyLock<Vec<f32>> = LazyLock::new(|| {
    (0..0x10000)
        .map(|i| {
            let r = i as f64 / 65535.0;
            let v = if r > 0.008856 {
                r.powf(1.0 / 3.0)
            } else {
                7.787 * r + 16.0 / 116.0
            };
            v as f32
        })
        .collect()
});

/// Camera channels to white-normalised XYZ.
pub fn xyz_from_camera(cam_to_xyz: &ColorMatrix) -> ColorMatrix {
    cam_to_xyz.scale_rows(D65_WHITE)
}

#[inline]
fn companded(v: f32) -> f32 {
    CBRT[(v as i32).clamp(0, 65535) as usize]
}

/// Converts a 16-bit camera RGB triple to scaled Lab.
#[inline]
pub fn camera_to_lab(rgb: [u16; 3], xyz_cam: &ColorMatrix) -> [i16; 3] {
    let xyz = xyz_cam.transform([rgb[0] as f32, rgb[1] as f32, rgb[2] as f32, 0.0]);
    let x = companded(xyz[0] + 0.5);
    let y = companded(xyz[1] + 0.5);
    let z = companded(xyz[2] + 0.5);
    [
        (LAB_SCALE * (116.0 * y - 16.0)) as i16,
        (LAB_SCALE * 500.0 * (x - y)) as i16,
        (LAB_SCALE * 200.0 * (y - z)) as i16,
    ]
}
