use super::Scenario;
use std::time::Duration;

/// Per-iteration consumer margin, multiplied by the iteration count
const MARGIN_PER_ITERATION: Duration = Duration::from_millis(2);

/// Growing-batch scenario: escalating bursts
/// Iteration i publishes 1 + increment * (i - 1) messages back to back, then
/// pauses for the interval. Later bursts take longer to publish and confirm,
/// so the consumer margin grows with the number of iterations.
pub struct GrowingBatchScenario {
    increment: u32,
}

impl GrowingBatchScenario {
    pub fn new(increment: u32) -> Self {
        Self { increment }
    }
}

impl Scenario for GrowingBatchScenario {
    fn message_count(&self, iteration: u32) -> u64 {
        let steps = u64::from(iteration.saturating_sub(1));
        u64::from(self.increment)
            .saturating_mul(steps)
            .saturating_add(1)
    }

    fn wait_margin(&self, iterations: u32) -> Duration {
        MARGIN_PER_ITERATION.saturating_mul(iterations)
    }

    fn name(&self) -> &'static str {
        "growing-batch"
    }
}
