use crate::config::Settings;
use crate::consumer::ConsumerWorker;
use crate::producer::ProducerWorker;
use crate::scenarios::ScenarioPlanner;
use crate::timing::Interrupt;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Producer,
    Consumer,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Producer => write!(f, "producer"),
            WorkerKind::Consumer => write!(f, "consumer"),
        }
    }
}

/// Workers launched for a scenario; producer-only runs skip the consumer.
pub fn worker_kinds(planner: &ScenarioPlanner) -> Vec<WorkerKind> {
    if planner.launches_consumer() {
        vec![WorkerKind::Producer, WorkerKind::Consumer]
    } else {
        vec![WorkerKind::Producer]
    }
}

/// Each worker gets its own task and its own session. Errors stay inside
/// the task that raised them; only the interrupt flag is shared.
fn spawn_worker(kind: WorkerKind, settings: Arc<Settings>, interrupt: Interrupt) -> JoinHandle<()> {
    match kind {
        WorkerKind::Producer => tokio::spawn(async move {
            let worker = ProducerWorker::new(&settings, interrupt);
            match worker.run(&settings).await {
                Ok(attempted) => info!(messages = attempted, "Producer finished"),
                Err(e) => error!(error = %e, "Producer failed"),
            }
        }),
        WorkerKind::Consumer => tokio::spawn(async move {
            let worker = ConsumerWorker::new(&settings, interrupt);
            match worker.run(&settings).await {
                Ok(()) => info!("Consumer finished"),
                Err(e) => error!(error = %e, "Consumer failed"),
            }
        }),
    }
}

/// Launch the workers and return once all of them have returned.
pub async fn run(settings: Settings) {
    let planner =
        ScenarioPlanner::new(settings.scenario.clone()).with_wait_margin(settings.wait_margin);
    let kinds = worker_kinds(&planner);

    info!(
        scenario = planner.name(),
        iterations = planner.iterations(),
        interval = ?planner.interval(),
        expected_messages = planner.total_messages(),
        consumer_budget = ?planner.consumer_wait_budget(),
        workers = kinds.len(),
        "Starting load run"
    );
    if !planner.launches_consumer() {
        info!("Producer-only scenario, no consumer launched");
    }

    let interrupt = Interrupt::new();
    let ctrl_c = interrupt.listen_for_ctrl_c();

    let settings = Arc::new(settings);
    let handles: Vec<_> = kinds
        .into_iter()
        .map(|kind| (kind, spawn_worker(kind, settings.clone(), interrupt.clone())))
        .collect();

    for (kind, handle) in handles {
        if let Err(e) = handle.await {
            error!(worker = %kind, error = %e, "Worker task aborted");
        }
    }

    ctrl_c.abort();
    if interrupt.is_triggered() {
        info!("Load run finished early after interrupt");
    } else {
        info!("Load run finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::settings_with;

    fn planner_for(overrides: &[(&'static str, &'static str)]) -> ScenarioPlanner {
        ScenarioPlanner::new(settings_with(overrides).scenario)
    }

    #[test]
    fn constant_rate_launches_both_workers() {
        assert_eq!(
            worker_kinds(&planner_for(&[])),
            vec![WorkerKind::Producer, WorkerKind::Consumer]
        );
    }

    #[test]
    fn growing_batch_launches_both_workers() {
        let planner = planner_for(&[
            ("scenario.type", "2"),
            ("scenario2.iterations", "3"),
            ("scenario2.interval", "500"),
            ("scenario2.increment", "2"),
        ]);
        assert_eq!(worker_kinds(&planner).len(), 2);
    }

    #[test]
    fn producer_only_launches_no_consumer() {
        let planner = planner_for(&[
            ("scenario.type", "3"),
            ("scenario3.iterations", "4"),
            ("scenario3.interval", "200"),
        ]);
        assert_eq!(worker_kinds(&planner), vec![WorkerKind::Producer]);
        assert_eq!(planner.total_messages(), 4);
    }
}
