use std::time::Duration;

/// Fixed-step accumulator decoupling simulation rate from frame rate.
///
/// Real frame time is accumulated and drained in `step`-sized slices. The
/// accumulator is capped at one minimum-rate frame, so a long stall slows the
/// game down instead of triggering an ever-growing catch-up burst.
#[derive(Clone, Debug)]
pub struct FixedTimestep {
    step: Duration,
    max_accumulated: Duration,
    accumulator: Duration,
}

impl FixedTimestep {
    /// `tick_rate` simulation steps per second; at most `1 / min_fps`
    /// seconds of backlog are kept.
    pub fn new(tick_rate: f64, min_fps: f64) -> Self {
        let step = Duration::from_secs_f64(1.0 / tick_rate);
        let max_accumulated = Duration::from_secs_f64(1.0 / min_fps).max(step);
        Self {
            step,
            max_accumulated,
            accumulator: Duration::ZERO,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Add elapsed frame time.
    pub fn accumulate(&mut self, delta: Duration) {
        self.accumulator = (self.accumulator + delta).min(self.max_accumulated);
    }

    /// Consume one step if enough time has accumulated.
    ///
    /// Call in a loop until it returns `false`.
    pub fn should_step(&mut self) -> bool {
        if self.accumulator >= self.step {
            self.accumulator -= self.step;
            true
        } else {
            false
        }
    }
}
