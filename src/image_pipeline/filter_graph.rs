//! Hand-off to the cosmetic filter graph
//!
//! The graph receives the interleaved RGBA image (alpha 1.0) and must return
//! a buffer of the same shape.

use tracing::debug;

use crate::image_pipeline::common::{PipelineError, Result, RgbaBufferF32};
use crate::image_pipeline::state::Stage;

pub trait FilterGraph: Send + Sync {
    fn apply(&self, image: RgbaBufferF32) -> Result<RgbaBufferF32>;
}

/// Graph without filters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl FilterGraph for PassThrough {
    fn apply(&self, image: RgbaBufferF32) -> Result<RgbaBufferF32> {
        Ok(image)
    }
}

/// Runs `graph` and checks that it kept the image's dimensions.
pub fn run_filter_graph(graph: &dyn FilterGraph, image: RgbaBufferF32) -> Result<RgbaBufferF32> {
    let (width, height) = (image.width(), image.height());
    let output = graph.apply(image)?;
    if (output.width(), output.height()) != (width, height) {
        return Err(PipelineError::stage(
            Stage::FilterGraph,
            format!(
                "filter graph returned {}x{} for a {}x{} input",
                output.width(),
                output.height(),
                width,
                height
            ),
        ));
    }
    debug!("Filter graph produced {}x{}", width, height);
    Ok(output)
}
