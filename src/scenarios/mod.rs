pub mod constant_rate;
pub mod growing_batch;
pub mod producer_only;

use crate::config::Properties;
use crate::error::{LoadError, Result};
use std::time::Duration;

/// Per-iteration consumer margin for scenarios whose batches do not grow
pub const FIXED_WAIT_MARGIN: Duration = Duration::from_millis(20);

/// Trait for load scenarios
pub trait Scenario {
    /// Messages to publish in `iteration` (1-based)
    fn message_count(&self, iteration: u32) -> u64;

    /// Extra time per iteration the consumer stays subscribed
    fn wait_margin(&self, iterations: u32) -> Duration;

    /// Whether a consumer worker runs alongside the producer
    fn launches_consumer(&self) -> bool {
        true
    }

    /// Get scenario name
    fn name(&self) -> &'static str;
}

/// Scenario selector, as written in `scenario.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One message per iteration
    ConstantRate,
    /// Batch grows by a fixed increment every iteration
    GrowingBatch,
    /// Like constant rate, without a consumer
    ProducerOnly,
}

impl ScenarioId {
    pub fn number(self) -> u32 {
        match self {
            ScenarioId::ConstantRate => 1,
            ScenarioId::GrowingBatch => 2,
            ScenarioId::ProducerOnly => 3,
        }
    }
}

impl TryFrom<u32> for ScenarioId {
    type Error = LoadError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(ScenarioId::ConstantRate),
            2 => Ok(ScenarioId::GrowingBatch),
            3 => Ok(ScenarioId::ProducerOnly),
            other => Err(LoadError::configuration(format!(
                "Property [scenario.type] must be 1, 2 or 3, got {}",
                other
            ))),
        }
    }
}

/// Scenario parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub id: ScenarioId,
    pub iterations: u32,
    pub interval: Duration,
    /// Batch growth per iteration; scenario 2 only, zero otherwise
    pub increment: u32,
}

impl ScenarioConfig {
    pub fn new(id: ScenarioId, iterations: u32, interval: Duration, increment: u32) -> Result<Self> {
        if iterations == 0 {
            return Err(LoadError::configuration(format!(
                "Property [scenario{}.iterations] must be at least 1",
                id.number()
            )));
        }
        Ok(Self {
            id,
            iterations,
            interval,
            increment,
        })
    }

    /// Read `scenario.type` and the keys of the selected scenario.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let id = ScenarioId::try_from(props.get_parsed::<u32>("scenario.type")?)?;
        let n = id.number();

        let iterations = props.get_parsed(&format!("scenario{}.iterations", n))?;
        let interval_ms: u64 = props.get_parsed(&format!("scenario{}.interval", n))?;
        let increment = match id {
            ScenarioId::GrowingBatch => props.get_parsed("scenario2.increment")?,
            _ => 0,
        };

        Self::new(id, iterations, Duration::from_millis(interval_ms), increment)
    }
}

/// Create a scenario instance from its config
pub fn create_scenario(config: &ScenarioConfig) -> Box<dyn Scenario + Send + Sync> {
    match config.id {
        ScenarioId::ConstantRate => Box::new(constant_rate::ConstantRateScenario),
        ScenarioId::GrowingBatch => {
            Box::new(growing_batch::GrowingBatchScenario::new(config.increment))
        }
        ScenarioId::ProducerOnly => Box::new(producer_only::ProducerOnlyScenario),
    }
}

/// Derives the iteration plan and the consumer's wait budget.
pub struct ScenarioPlanner {
    config: ScenarioConfig,
    scenario: Box<dyn Scenario + Send + Sync>,
    margin_override: Option<Duration>,
}

impl ScenarioPlanner {
    pub fn new(config: ScenarioConfig) -> Self {
        let scenario = create_scenario(&config);
        Self {
            config,
            scenario,
            margin_override: None,
        }
    }

    /// Replace the scenario's per-iteration margin.
    pub fn with_wait_margin(mut self, margin: Option<Duration>) -> Self {
        self.margin_override = margin;
        self
    }

    pub fn name(&self) -> &'static str {
        self.scenario.name()
    }

    pub fn iterations(&self) -> u32 {
        self.config.iterations
    }

    /// Delay after every iteration
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn message_count(&self, iteration: u32) -> u64 {
        self.scenario.message_count(iteration)
    }

    /// Sum of `message_count` over the whole run
    pub fn total_messages(&self) -> u64 {
        (1..=self.iterations())
            .map(|i| self.message_count(i))
            .fold(0u64, u64::saturating_add)
    }

    pub fn wait_margin(&self) -> Duration {
        self.margin_override
            .unwrap_or_else(|| self.scenario.wait_margin(self.iterations()))
    }

    /// `iterations * (interval + margin)`. A heuristic, not a rendezvous.
    pub fn consumer_wait_budget(&self) -> Duration {
        self.interval()
            .saturating_add(self.wait_margin())
            .saturating_mul(self.iterations())
    }

    pub fn launches_consumer(&self) -> bool {
        self.scenario.launches_consumer()
    }
}
