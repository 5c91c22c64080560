//! Colour processing: black level, white balance, colour matrices, tone
//! curves and histograms.

pub mod black_level;
pub mod convert;
pub mod gamma;
pub mod histogram;
pub mod matrix;
pub mod white_balance;

pub use black_level::{NormalizedBlack, normalize as normalize_black, subtract_grid};
pub use convert::convert_to_rgb;
pub use gamma::{CurveDirection, FULL_RANGE_WHITE, GammaCurve, GammaParams, ToneCurve};
pub use histogram::{HISTOGRAM_BUCKETS, Histogram};
pub use matrix::{ColorMatrix, D65_WHITE, WorkingSpace, camera_to_working};
pub use white_balance::{MultiplierSource, WhiteBalance};
