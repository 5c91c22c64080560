use crate::image_pipeline::common::SparseColorBuffer;
use crate::image_pipeline::raw::CfaPattern;

/// Moves second-green samples into the green slot and returns the pattern
/// with both lattices labelled as green.
///
/// Only three-colour sensors are merged; a real fourth colour is left alone.
pub fn merge_green_lattices(buffer: &mut SparseColorBuffer, cfa: &CfaPattern) -> CfaPattern {
    if buffer.colors != 3 || !cfa.is_bayer() {
        return *cfa;
    }
    let width = buffer.width();
    for (i, px) in buffer.pixels.pixels_mut().iter_mut().enumerate() {
        if cfa.color(i / width, i % width) == 3 {
            px[1] = px[3];
            px[3] = 0;
        }
    }
    cfa.merge_greens()
}
