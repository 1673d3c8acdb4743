use crate::auth;
use crate::broker::Session;
use crate::config::Settings;
use crate::error::{LoadError, Result};
use crate::message::is_end_of_stream;
use crate::metrics::Counters;
use crate::scenarios::ScenarioPlanner;
use crate::timing::{pause, Interrupt, WaitOutcome};
use futures::{Stream, StreamExt};
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const CONSUMER_TAG: &str = "rabbitmq-load-consumer";

/// Bytes of each body shown in the per-message log line
const PREVIEW_LEN: usize = 20;

/// Why the consumer stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEnd {
    /// The full wait budget elapsed
    Budget,
    /// Ctrl-C cut the wait short
    Interrupted,
    /// The producer's end-of-stream marker arrived
    Marker,
}

impl From<WaitOutcome> for WaitEnd {
    fn from(outcome: WaitOutcome) -> Self {
        match outcome {
            WaitOutcome::Elapsed => WaitEnd::Budget,
            WaitOutcome::Interrupted => WaitEnd::Interrupted,
        }
    }
}

fn preview(body: &[u8]) -> String {
    String::from_utf8_lossy(&body[..body.len().min(PREVIEW_LEN)]).into_owned()
}

async fn drain<S>(deliveries: S, counters: Arc<Counters>, mut marker: Option<oneshot::Sender<()>>)
where
    S: Stream<Item = Result<Vec<u8>>>,
{
    let mut deliveries = std::pin::pin!(deliveries);

    while let Some(delivery) = deliveries.next().await {
        match delivery {
            Ok(body) if is_end_of_stream(&body) => {
                info!("End-of-stream marker received");
                if let Some(tx) = marker.take() {
                    let _ = tx.send(());
                }
            }
            Ok(body) => {
                counters.inc_received(body.len() as u64);
                debug!(size = body.len(), preview = %preview(&body), "Message received");
            }
            Err(e) => {
                counters.inc_errors();
                warn!(error = %e, "Delivery failed");
            }
        }
    }

    // No resubscription: the worker keeps waiting out its budget.
    info!("Subscription cancelled, no further deliveries");
}

/// Auto-ack subscriber that stays alive for the planner's wait budget.
pub struct ConsumerWorker {
    planner: ScenarioPlanner,
    end_marker: bool,
    counters: Arc<Counters>,
    interrupt: Interrupt,
}

impl ConsumerWorker {
    pub fn new(settings: &Settings, interrupt: Interrupt) -> Self {
        Self {
            planner: ScenarioPlanner::new(settings.scenario.clone())
                .with_wait_margin(settings.wait_margin),
            end_marker: settings.end_marker,
            counters: Counters::new(),
            interrupt,
        }
    }

    #[cfg(test)]
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub async fn run(self, settings: &Settings) -> Result<()> {
        info!(
            scenario = self.planner.name(),
            queue = %settings.broker.queue,
            budget = ?self.planner.consumer_wait_budget(),
            "Consumer started"
        );

        let token = auth::fetch_access_token(&settings.credentials, settings.tls).await?;
        let session = Session::open(&settings.broker, &token, "consumer").await?;

        let consumer = match session
            .channel()
            .basic_consume(
                &settings.broker.queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                session.close().await;
                return Err(LoadError::transport("basic.consume", e));
            }
        };
        debug!(queue = %settings.broker.queue, "Subscribed with automatic acknowledgement");

        let deliveries = consumer.map(|delivery| {
            delivery
                .map(|d| d.data)
                .map_err(|e| LoadError::transport("delivery", e))
        });
        let end = self.observe(deliveries).await;
        debug!(?end, "Consumer wait over");

        session.close().await;
        self.counters.snapshot().log_consumer_summary();
        Ok(())
    }

    /// Count deliveries in the background while waiting out the budget.
    /// Returns regardless of how many messages actually arrived.
    pub async fn observe<S>(&self, deliveries: S) -> WaitEnd
    where
        S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
    {
        let (marker_tx, marker_rx) = oneshot::channel();
        let drain = tokio::spawn(drain(
            deliveries,
            self.counters.clone(),
            self.end_marker.then_some(marker_tx),
        ));

        let budget = self.planner.consumer_wait_budget();
        let end = if self.end_marker {
            tokio::select! {
                outcome = pause(budget, "consumer budget", &self.interrupt) => {
                    WaitEnd::from(outcome)
                }
                Ok(()) = marker_rx => WaitEnd::Marker,
            }
        } else {
            WaitEnd::from(pause(budget, "consumer budget", &self.interrupt).await)
        };

        drain.abort();
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::settings_with;
    use crate::message::{Message, MessageGenerator};
    use futures::stream;
    use std::time::Duration;
    use tokio::time::Instant;

    fn bodies(n: usize) -> Vec<Result<Vec<u8>>> {
        let generator = MessageGenerator::new(64);
        (0..n).map(|_| Ok(generator.next().body)).collect()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_full_budget_after_receiving_everything() {
        let worker = ConsumerWorker::new(&settings_with(&[]), Interrupt::new());
        let counters = worker.counters();
        let deliveries = stream::iter(bodies(5)).chain(stream::pending::<Result<Vec<u8>>>());
        let start = Instant::now();

        let end = worker.observe(deliveries).await;

        assert_eq!(end, WaitEnd::Budget);
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(5100) && elapsed < ms(5150), "elapsed {:?}", elapsed);
        assert_eq!(counters.snapshot().messages_received, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn growing_batch_budget_is_respected() {
        let settings = settings_with(&[
            ("scenario.type", "2"),
            ("scenario2.iterations", "3"),
            ("scenario2.interval", "500"),
            ("scenario2.increment", "2"),
        ]);
        let worker = ConsumerWorker::new(&settings, Interrupt::new());
        let start = Instant::now();

        worker.observe(stream::pending::<Result<Vec<u8>>>()).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= ms(1518) && elapsed < ms(1560), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_subscription_still_waits_out_the_budget() {
        let worker = ConsumerWorker::new(&settings_with(&[]), Interrupt::new());
        let counters = worker.counters();
        // stream ends the way a broker-side cancel ends a lapin consumer
        let deliveries = stream::iter(bodies(2));
        let start = Instant::now();

        assert_eq!(worker.observe(deliveries).await, WaitEnd::Budget);
        assert!(start.elapsed() >= ms(5100));
        assert_eq!(counters.snapshot().messages_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_early_on_end_marker_when_enabled() {
        let worker = ConsumerWorker::new(
            &settings_with(&[("scenario.end-marker", "true")]),
            Interrupt::new(),
        );
        let counters = worker.counters();
        let mut items = bodies(3);
        items.push(Ok(Message::end_of_stream().body));
        let deliveries = stream::iter(items).chain(stream::pending::<Result<Vec<u8>>>());
        let start = Instant::now();

        assert_eq!(worker.observe(deliveries).await, WaitEnd::Marker);
        assert!(start.elapsed() < ms(100));
        assert_eq!(counters.snapshot().messages_received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn marker_is_ignored_for_timing_when_disabled() {
        let worker = ConsumerWorker::new(&settings_with(&[]), Interrupt::new());
        let counters = worker.counters();
        let marker: Vec<Result<Vec<u8>>> = vec![Ok(Message::end_of_stream().body)];
        let deliveries = stream::iter(marker).chain(stream::pending::<Result<Vec<u8>>>());
        let start = Instant::now();

        assert_eq!(worker.observe(deliveries).await, WaitEnd::Budget);
        assert!(start.elapsed() >= ms(5100));
        assert_eq!(counters.snapshot().messages_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_errors_are_counted_and_skipped() {
        let worker = ConsumerWorker::new(
            &settings_with(&[("consumer.wait-margin", "0")]),
            Interrupt::new(),
        );
        let counters = worker.counters();
        let mut items = bodies(1);
        items.push(Err(LoadError::transport("delivery", "frame error")));
        items.extend(bodies(1));
        let start = Instant::now();

        worker.observe(stream::iter(items)).await;

        assert!(start.elapsed() >= ms(5000));
        let snap = counters.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_ends_the_wait_and_keeps_the_count() {
        let interrupt = Interrupt::new();
        let worker = ConsumerWorker::new(&settings_with(&[]), interrupt.clone());
        let counters = worker.counters();
        let deliveries = stream::iter(bodies(2)).chain(stream::pending::<Result<Vec<u8>>>());
        tokio::spawn(async move {
            tokio::time::sleep(ms(200)).await;
            interrupt.trigger();
        });
        let start = Instant::now();

        assert_eq!(worker.observe(deliveries).await, WaitEnd::Interrupted);
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(200) && elapsed < ms(250), "elapsed {:?}", elapsed);
        assert_eq!(counters.snapshot().messages_received, 2);
    }

    #[test]
    fn preview_is_bounded() {
        assert_eq!(preview(b"Message 1 **********************"), "Message 1 **********");
        assert_eq!(preview(b"short"), "short");
    }
}
