//! Image processing pipeline module
//!
//! RAW decoding, demosaicing and colour reconstruction, with a staged
//! execution model whose intermediate results can be cached so that late
//! adjustments re-run only the stages after the checkpoint.

pub mod cache;
pub mod color;
pub mod common;
pub mod conversions;
pub mod debayer;
pub mod demosaic;
pub mod filter_graph;
pub mod lens;
pub mod pixel_format;
pub mod raw;
pub mod state;
pub mod tiff;

pub use common::{CancellationToken, PipelineError, Result};

pub use raw::{CameraIdentity, CfaPattern, RawDecoder, RawFrame, RawLoaderDecoder};

pub use demosaic::{DemosaicAlgorithm, Demosaicer};

pub use cache::{CacheConfig, CacheConfigBuilder, ImageIdentity, IntermediateCache};

pub use state::{ProgressCallback, Stage};

pub use tiff::{OutputConfig, OutputConfigBuilder, StandardTiffWriter, TiffCompression, TiffWriter};

pub use conversions::{
    Adjustments, FinalImage, JobHandle, PipelineConfig, PipelineConfigBuilder, PipelineJob,
    PipelineOutcome, RawPipeline, RawSource,
};
