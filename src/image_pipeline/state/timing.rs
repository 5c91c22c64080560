use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::info;

use crate::image_pipeline::state::Stage;

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct StageTimings {
    steps: Vec<StageTiming>,
    by_stage: HashMap<Stage, Duration>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, stage: Stage, duration: Duration) {
        self.steps.push(StageTiming { stage, duration });
        *self.by_stage.entry(stage).or_insert(Duration::ZERO) += duration;
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.by_stage.get(&stage).copied()
    }

    pub fn steps(&self) -> &[StageTiming] {
        &self.steps
    }

    pub fn log_summary(&self) {
        let total = self.total_duration();
        info!("Pipeline timing summary:");
        for step in &self.steps {
            let percentage = if total.as_secs_f64() > 0.0 {
                (step.duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            } else {
                0.0
            };
            info!(
                "  {:<24} {:>10.3}ms ({:>5.1}%)",
                step.stage.name(),
                step.duration.as_secs_f64() * 1000.0,
                percentage
            );
        }
        info!("  {:<24} {:>10.3}ms", "total", total.as_secs_f64() * 1000.0);
    }
}

pub struct Timer {
    start: Instant,
    stage: Stage,
}

impl Timer {
    pub fn start(stage: Stage) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn stop(self) -> (Stage, Duration) {
        (self.stage, self.start.elapsed())
    }
}
