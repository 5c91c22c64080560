use std::io::{Cursor, Write};

use rayon::prelude::*;
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder, colortype};
use tiff::tags::Predictor;
use tracing::{debug, instrument};

use crate::image_pipeline::common::{PipelineError, Result, RgbaBufferF32};
use crate::image_pipeline::tiff::types::{OutputConfig, TiffCompression};
use crate::image_pipeline::tiff::writer::TiffWriter;

pub struct StandardTiffWriter;

impl StandardTiffWriter {
    fn quantize(image: &RgbaBufferF32) -> Vec<u16> {
        image
            .pixels()
            .par_iter()
            .flat_map_iter(|px| {
                px[..3]
                    .iter()
                    .map(|v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
            })
            .collect()
    }
}

impl TiffWriter for StandardTiffWriter {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn write_rgba(&self, image: &RgbaBufferF32, output: &mut dyn Write, config: &OutputConfig) -> Result<()> {
        debug!("Encoding TIFF image: {}x{}", image.width(), image.height());

        let data = Self::quantize(image);
        let mut buffer = Vec::new();

        let compression = match config.compression {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        };

        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(|e| PipelineError::EncodeError(e.to_string()))?
            .with_compression(compression);

        if let Some(predictor_val) = config.predictor {
            let predictor = match predictor_val {
                2 => Predictor::Horizontal,
                _ => Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        encoder
            .write_image::<colortype::RGB16>(image.width() as u32, image.height() as u32, &data)
            .map_err(|e| PipelineError::EncodeError(e.to_string()))?;

        output
            .write_all(&buffer)
            .map_err(|e| PipelineError::OutputWriteError(e.to_string()))?;

        debug!("TIFF encoding complete, {} bytes", buffer.len());
        Ok(())
    }
}
