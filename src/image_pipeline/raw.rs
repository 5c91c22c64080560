//! RAW image reading module
//!
//! This module defines the immutable [`RawFrame`] snapshot the rest of the
//! pipeline consumes, the CFA pattern model, and the decoding collaborator.

pub mod cfa;
mod rawloader_reader;
mod reader;
pub mod types;

pub use cfa::CfaPattern;
pub use rawloader_reader::RawLoaderDecoder;
pub use reader::RawDecoder;
pub use types::{BlackGrid, BlackLevels, CameraIdentity, RawFrame};
