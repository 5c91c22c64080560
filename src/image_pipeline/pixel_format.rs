//! Buffer representation changes between the integer colour stages and the
//! floating point filter graph.

pub mod converter;
pub mod planar_ops;

pub use converter::PixelFormatConverter;
pub use planar_ops::{Morphology, contrast_stretch, convolve3x3, morphology, rotate_quarter_turns};
