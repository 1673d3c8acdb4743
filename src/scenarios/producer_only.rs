use super::{Scenario, FIXED_WAIT_MARGIN};
use std::time::Duration;

/// Producer-only scenario: constant-rate publishing with nobody consuming
/// Lets the queue fill up so broker-side backlog behaviour can be observed.
pub struct ProducerOnlyScenario;

impl Scenario for ProducerOnlyScenario {
    fn message_count(&self, _iteration: u32) -> u64 {
        1
    }

    fn wait_margin(&self, _iterations: u32) -> Duration {
        FIXED_WAIT_MARGIN
    }

    fn launches_consumer(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "producer-only"
    }
}
