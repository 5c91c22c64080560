use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::raw::types::RawFrame;

/// Parses a vendor RAW file into a [`RawFrame`].
pub trait RawDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<RawFrame>;
}
