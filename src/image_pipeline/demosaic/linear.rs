use std::io::Cursor;

use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use tracing::{debug, instrument};

use crate::image_pipeline::color::ColorMatrix;
use crate::image_pipeline::common::{CancellationToken, PipelineError, Result, SparseColorBuffer};
use crate::image_pipeline::demosaic::Demosaicer;
use crate::image_pipeline::raw::CfaPattern;
use crate::image_pipeline::state::Stage;

/// Fast bilinear preview interpolation backed by the `bayer` crate.
pub struct LinearDemosaicer;

impl LinearDemosaicer {
    fn bayer_cfa(cfa: &CfaPattern) -> Result<CFA> {
        match cfa.bayer_cell() {
            Some([0, 1, 1, 2]) => Ok(CFA::RGGB),
            Some([2, 1, 1, 0]) => Ok(CFA::BGGR),
            Some([1, 0, 2, 1]) => Ok(CFA::GRBG),
            Some([1, 2, 0, 1]) => Ok(CFA::GBRG),
            _ => Err(PipelineError::UnsupportedSensorPattern(format!(
                "pattern {:#010x} is not a 2x2 Bayer layout",
                cfa.id()
            ))),
        }
    }
}

impl Demosaicer for LinearDemosaicer {
    fn name(&self) -> &'static str {
        "linear"
    }

    #[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
    fn demosaic(
        &self,
        mut buffer: SparseColorBuffer,
        cfa: &CfaPattern,
        _cam_to_xyz: &ColorMatrix,
        cancel: &CancellationToken,
    ) -> Result<SparseColorBuffer> {
        let width = buffer.width();
        let height = buffer.height();
        let pattern = Self::bayer_cfa(cfa)?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // The bayer crate reads a packed little-endian 16-bit mosaic
        let mut mosaic = Vec::with_capacity(width * height * 2);
        for (i, px) in buffer.pixels.pixels().iter().enumerate() {
            let c = cfa.color(i / width, i % width);
            mosaic.extend_from_slice(&px[c].to_le_bytes());
        }

        let mut output = vec![0u8; width * height * 3 * 2];
        debug!("Running bayer linear demosaic, filters={:#010x}", cfa.id());
        {
            let mut raster = RasterMut::new(width, height, RasterDepth::Depth16, &mut output);
            bayer::run_demosaic(
                &mut Cursor::new(&mosaic[..]),
                BayerDepth::Depth16LE,
                pattern,
                Demosaic::Linear,
                &mut raster,
            )
            .map_err(|e| PipelineError::stage(Stage::Interpolate, format!("{e:?}")))?;
        }

        for (px, rgb) in buffer
            .pixels
            .pixels_mut()
            .iter_mut()
            .zip(output.chunks_exact(6))
        {
            for c in 0..3 {
                px[c] = u16::from_le_bytes([rgb[2 * c], rgb[2 * c + 1]]);
            }
        }

        buffer.colors = 3;
        Ok(buffer)
    }
}
