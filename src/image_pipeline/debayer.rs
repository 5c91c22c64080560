//! Bayer extraction: mosaic to sparse buffer, green lattice merge and
//! border interpolation.

pub mod border;
pub mod extract;
pub mod green;

pub use border::border_interpolate;
pub use extract::{BayerExtractor, Extracted};
pub use green::merge_green_lattices;
