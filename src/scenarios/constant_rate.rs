use super::{Scenario, FIXED_WAIT_MARGIN};
use std::time::Duration;

/// Constant-rate scenario: one message every interval
/// Baseline for confirm and delivery latency at a steady pace.
pub struct ConstantRateScenario;

impl Scenario for ConstantRateScenario {
    fn message_count(&self, _iteration: u32) -> u64 {
        1
    }

    fn wait_margin(&self, _iterations: u32) -> Duration {
        FIXED_WAIT_MARGIN
    }

    fn name(&self) -> &'static str {
        "constant-rate"
    }
}
