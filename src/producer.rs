use crate::auth;
use crate::broker::Session;
use crate::config::Settings;
use crate::error::{LoadError, Result};
use crate::message::{Message, MessageGenerator};
use crate::metrics::Counters;
use crate::scenarios::ScenarioPlanner;
use crate::timing::{pause, Interrupt};
use async_trait::async_trait;
use lapin::message::BasicReturnMessage;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::{Confirmation, PublisherConfirm};
use lapin::{BasicProperties, Channel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Where the producer hands its messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, message: &Message) -> Result<()>;
}

/// Publishes to one exchange/routing key and forwards each pending
/// confirmation to the observer task.
struct AmqpSink {
    channel: Channel,
    exchange: String,
    routing_key: String,
    confirms: mpsc::UnboundedSender<(u64, PublisherConfirm)>,
}

#[async_trait]
impl MessageSink for AmqpSink {
    async fn publish(&self, message: &Message) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| LoadError::Publish {
                sequence: message.sequence_number,
                message: e.to_string(),
            })?;

        // Observer gone means the run is shutting down; nothing left to log.
        let _ = self.confirms.send((message.sequence_number, confirm));
        Ok(())
    }
}

/// Log and count one broker confirmation. No behavioural effect.
pub(crate) fn record_confirmation(
    sequence: u64,
    result: lapin::Result<Confirmation>,
    counters: &Counters,
) {
    match result {
        Ok(Confirmation::Ack(returned)) => {
            counters.inc_acked();
            debug!(sequence, "Ack");
            if let Some(returned) = returned {
                log_returned(sequence, &returned, counters);
            }
        }
        Ok(Confirmation::Nack(returned)) => {
            counters.inc_nacked();
            warn!(sequence, "Nack");
            if let Some(returned) = returned {
                log_returned(sequence, &returned, counters);
            }
        }
        Ok(Confirmation::NotRequested) => {
            debug!(sequence, "Confirm not requested");
        }
        Err(e) => {
            counters.inc_errors();
            warn!(sequence, error = %e, "Confirmation lost");
        }
    }
}

fn log_returned(sequence: u64, returned: &BasicReturnMessage, counters: &Counters) {
    counters.inc_returned();
    warn!(
        sequence,
        reply_code = returned.reply_code,
        reply_text = %returned.reply_text.as_str(),
        exchange = %returned.delivery.exchange.as_str(),
        routing_key = %returned.delivery.routing_key.as_str(),
        "Message returned by broker"
    );
}

async fn observe_confirms(
    mut pending: mpsc::UnboundedReceiver<(u64, PublisherConfirm)>,
    counters: Arc<Counters>,
) {
    while let Some((sequence, confirm)) = pending.recv().await {
        record_confirmation(sequence, confirm.await, &counters);
    }
}

/// Publishes the scenario's iteration plan through a confirm-mode session.
pub struct ProducerWorker {
    planner: ScenarioPlanner,
    generator: MessageGenerator,
    confirm_grace: Duration,
    end_marker: bool,
    counters: Arc<Counters>,
    interrupt: Interrupt,
}

impl ProducerWorker {
    pub fn new(settings: &Settings, interrupt: Interrupt) -> Self {
        Self {
            planner: ScenarioPlanner::new(settings.scenario.clone()),
            generator: MessageGenerator::new(settings.message_size),
            confirm_grace: settings.confirm_grace,
            end_marker: settings.end_marker,
            counters: Counters::new(),
            interrupt,
        }
    }

    #[cfg(test)]
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Full producer lifecycle. Returns the number of messages attempted.
    pub async fn run(self, settings: &Settings) -> Result<u64> {
        info!(
            scenario = self.planner.name(),
            iterations = self.planner.iterations(),
            interval = ?self.planner.interval(),
            expected = self.planner.total_messages(),
            message_size = self.generator.size(),
            "Producer started"
        );

        let token = auth::fetch_access_token(&settings.credentials, settings.tls).await?;
        let session = Session::open(&settings.broker, &token, "producer").await?;

        if let Err(e) = session
            .channel()
            .confirm_select(ConfirmSelectOptions::default())
            .await
        {
            session.close().await;
            return Err(LoadError::transport("confirm.select", e));
        }
        debug!("Publisher confirms enabled");

        let (confirms_tx, confirms_rx) = mpsc::unbounded_channel();
        let observer = tokio::spawn(observe_confirms(confirms_rx, self.counters.clone()));

        let sink = AmqpSink {
            channel: session.channel().clone(),
            exchange: settings.broker.exchange.clone(),
            routing_key: settings.broker.routing_key.clone(),
            confirms: confirms_tx,
        };

        let attempted = self.produce(&sink).await;

        observer.abort();
        drop(sink);
        session.close().await;
        self.counters.snapshot().log_producer_summary();

        Ok(attempted)
    }

    /// Publish every iteration, then leave the grace period for confirms.
    pub async fn produce<S: MessageSink + ?Sized>(&self, sink: &S) -> u64 {
        let attempted = self.drive(sink).await;
        pause(self.confirm_grace, "publisher confirms", &self.interrupt).await;
        attempted
    }

    /// Publish every iteration of the plan. A failed publish is logged and
    /// counted; the loop carries on. An interrupt ends the plan early.
    pub async fn drive<S: MessageSink + ?Sized>(&self, sink: &S) -> u64 {
        let mut attempted = 0u64;

        'plan: for iteration in 1..=self.planner.iterations() {
            let count = self.planner.message_count(iteration);
            debug!(iteration, count, "Iteration started");

            for _ in 0..count {
                if self.interrupt.is_triggered() {
                    warn!(
                        iteration,
                        attempted,
                        planned = self.planner.total_messages(),
                        "Run interrupted, skipping remaining messages"
                    );
                    break 'plan;
                }
                let message = self.generator.next();
                attempted += 1;

                match sink.publish(&message).await {
                    Ok(()) => {
                        self.counters.inc_sent(message.size() as u64);
                        debug!(
                            iteration,
                            sequence = message.sequence_number,
                            size = message.size(),
                            "Message sent"
                        );
                    }
                    Err(e) => {
                        self.counters.inc_publish_failed();
                        error!(
                            iteration,
                            sequence = message.sequence_number,
                            error = %e,
                            "Publish failed, continuing"
                        );
                    }
                }
            }

            pause(self.planner.interval(), "producer interval", &self.interrupt).await;
        }

        debug!(generated = self.generator.generated(), "Iteration plan complete");

        if self.end_marker {
            match sink.publish(&Message::end_of_stream()).await {
                Ok(()) => info!("End-of-stream marker sent"),
                Err(e) => warn!(error = %e, "End-of-stream marker not sent"),
            }
        }

        attempted
    }
}
