//! Common utilities module
//!
//! This module contains the error taxonomy, the typed pixel buffers and the
//! cancellation token shared by every pipeline stage.

pub mod buffer;
pub mod cancel;
pub mod error;

pub use buffer::{PixelBuffer, PlanarBuffer, RgbBuffer16, RgbaBufferF32, SparseColorBuffer};
pub use cancel::CancellationToken;
pub use error::{PipelineError, Result};
