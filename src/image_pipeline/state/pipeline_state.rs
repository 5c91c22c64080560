use tracing::debug;

use crate::image_pipeline::common::{CancellationToken, PipelineError, Result};
use crate::image_pipeline::state::{Stage, StageTimings, Timer};

/// Stage whose output is stored in the intermediate cache.
pub const CACHE_CHECKPOINT: Stage = Stage::ColorConvert;

/// Invoked with each stage a run enters.
pub type ProgressCallback = Box<dyn FnMut(Stage) + Send>;

/// Sequencer for one pipeline run.
///
/// Owned by the worker executing the run. Stages only move forward; the
/// cancellation token is consulted before entering each one, so a stage that
/// has started always completes.
pub struct PipelineState {
    current: Option<Stage>,
    timer: Option<Timer>,
    timings: StageTimings,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    use_cache: bool,
}

impl PipelineState {
    pub fn new(cancel: CancellationToken, progress: Option<ProgressCallback>, use_cache: bool) -> Self {
        Self {
            current: None,
            timer: None,
            timings: StageTimings::new(),
            cancel,
            progress,
            use_cache,
        }
    }

    pub fn current(&self) -> Option<Stage> {
        self.current
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    /// Enters `next`, closing the timing of the stage in flight.
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            debug!("Cancellation observed before {}", next);
            self.close_timer();
            return Err(PipelineError::Cancelled);
        }
        if let Some(current) = self.current {
            if next <= current {
                return Err(PipelineError::stage(
                    next,
                    format!("cannot enter {next} after {current}"),
                ));
            }
        }

        self.close_timer();
        debug!("Entering stage {}", next);
        self.current = Some(next);
        self.timer = Some(Timer::start(next));
        if let Some(progress) = self.progress.as_mut() {
            progress(next);
        }
        Ok(())
    }

    /// Whether the output of `stage` should be written to the cache.
    pub fn should_cache(&self, stage: Stage) -> bool {
        self.use_cache && stage == CACHE_CHECKPOINT
    }

    /// Ends the run and hands back the per-stage timings.
    pub fn finish(mut self) -> StageTimings {
        self.close_timer();
        self.timings
    }

    fn close_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            let (stage, duration) = timer.stop();
            self.timings.add_step(stage, duration);
        }
    }
}
