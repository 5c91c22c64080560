//! Lens correction
//!
//! Profiles come from a [`LensDatabase`] queried with the camera and lens
//! names the decoder reported. A missing profile is not an error; the stage
//! is skipped. Both models measure the radius from the image centre in units
//! of half the diagonal.

pub mod distortion;
pub mod vignetting;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::image_pipeline::raw::CameraIdentity;

pub use distortion::correct_distortion;
pub use vignetting::correct_vignetting;

/// Polynomial light falloff: observed = true × (1 + k1 r² + k2 r⁴ + k3 r⁶).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VignettingModel {
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
}

impl VignettingModel {
    #[inline]
    pub fn gain(&self, r: f32) -> f32 {
        let r2 = r * r;
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }
}

/// PTLens radial distortion: `r_d = r_u (a r_u³ + b r_u² + c r_u + 1 − a − b − c)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionModel {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl DistortionModel {
    /// Distorted radius observed for an undistorted radius `r`.
    #[inline]
    pub fn distort(&self, r: f32) -> f32 {
        let d = 1.0 - self.a - self.b - self.c;
        r * (((self.a * r + self.b) * r + self.c) * r + d)
    }

    pub fn is_identity(&self) -> bool {
        self.a == 0.0 && self.b == 0.0 && self.c == 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LensProfile {
    pub vignetting: Vec<VignettingModel>,
    pub distortion: Option<DistortionModel>,
}

impl LensProfile {
    pub fn is_empty(&self) -> bool {
        self.vignetting.is_empty() && self.distortion.is_none_or(|d| d.is_identity())
    }
}

/// Lookup of correction parameters by camera and lens.
pub trait LensDatabase: Send + Sync {
    fn lookup(&self, camera: &CameraIdentity) -> Option<LensProfile>;
}

/// Database without any profiles; correction is always skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLensDatabase;

impl LensDatabase for NoLensDatabase {
    fn lookup(&self, _camera: &CameraIdentity) -> Option<LensProfile> {
        None
    }
}

/// In-memory profiles keyed by `(camera make, camera model, lens)`.
#[derive(Debug, Default, Clone)]
pub struct StaticLensDatabase {
    profiles: HashMap<(String, String, String), LensProfile>,
}

impl StaticLensDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, make: &str, model: &str, lens: &str, profile: LensProfile) {
        self.profiles.insert(
            (make.to_lowercase(), model.to_lowercase(), lens.to_lowercase()),
            profile,
        );
    }
}

impl LensDatabase for StaticLensDatabase {
    fn lookup(&self, camera: &CameraIdentity) -> Option<LensProfile> {
        let lens = camera.lens.as_deref()?;
        self.profiles
            .get(&(
                camera.make.to_lowercase(),
                camera.model.to_lowercase(),
                lens.to_lowercase(),
            ))
            .cloned()
    }
}

/// Radius normaliser shared by the correction passes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub cx: f32,
    pub cy: f32,
    pub inv_half_diagonal: f32,
}

impl Geometry {
    pub fn new(width: usize, height: usize) -> Self {
        let cx = (width as f32 - 1.0) * 0.5;
        let cy = (height as f32 - 1.0) * 0.5;
        let half_diagonal = ((width * width + height * height) as f32).sqrt() * 0.5;
        Self {
            cx,
            cy,
            inv_half_diagonal: if half_diagonal > 0.0 { 1.0 / half_diagonal } else { 0.0 },
        }
    }

    #[inline]
    pub fn radius(&self, row: usize, col: usize) -> f32 {
        let dx = col as f32 - self.cx;
        let dy = row as f32 - self.cy;
        (dx * dx + dy * dy).sqrt() * self.inv_half_diagonal
    }
}
