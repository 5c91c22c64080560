//! Per-run stage sequencing
//!
//! [`Stage`] is the ordered enumeration every run walks through,
//! [`PipelineState`] enforces that order, reports progress and observes
//! cancellation, and [`StageTimings`] records how long each stage took.

pub mod pipeline_state;
pub mod stage;
pub mod timing;

pub use pipeline_state::{CACHE_CHECKPOINT, PipelineState, ProgressCallback};
pub use stage::Stage;
pub use timing::{StageTiming, StageTimings, Timer};
