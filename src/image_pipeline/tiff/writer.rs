use std::io::Write;

use crate::image_pipeline::common::{Result, RgbaBufferF32};
use crate::image_pipeline::tiff::types::OutputConfig;

pub trait TiffWriter {
    /// Writes the colour channels of `image` as 16-bit RGB; alpha is dropped.
    fn write_rgba(&self, image: &RgbaBufferF32, output: &mut dyn Write, config: &OutputConfig) -> Result<()>;
}
