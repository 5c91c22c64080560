//! TIFF writing module
//!
//! Encodes finished RGBA images as 16-bit RGB TIFF files with the usual
//! compression options.

mod standard_tiff_writer;
pub mod types;
mod writer;

pub use standard_tiff_writer::StandardTiffWriter;
pub use types::{OutputConfig, OutputConfigBuilder, TiffCompression};
pub use writer::TiffWriter;
