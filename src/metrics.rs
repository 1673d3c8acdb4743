use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Atomic counters for one worker
#[derive(Debug, Default)]
pub struct Counters {
    pub messages_sent: AtomicU64,
    pub publish_failures: AtomicU64,
    pub confirms_acked: AtomicU64,
    pub confirms_nacked: AtomicU64,
    pub messages_returned: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Acquire),
            publish_failures: self.publish_failures.load(Ordering::Acquire),
            confirms_acked: self.confirms_acked.load(Ordering::Acquire),
            confirms_nacked: self.confirms_nacked.load(Ordering::Acquire),
            messages_returned: self.messages_returned.load(Ordering::Acquire),
            messages_received: self.messages_received.load(Ordering::Acquire),
            bytes_sent: self.bytes_sent.load(Ordering::Acquire),
            bytes_received: self.bytes_received.load(Ordering::Acquire),
            errors: self.errors.load(Ordering::Acquire),
        }
    }

    pub fn inc_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_acked(&self) {
        self.confirms_acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_nacked(&self) {
        self.confirms_nacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_returned(&self) {
        self.messages_returned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`Counters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub messages_sent: u64,
    pub publish_failures: u64,
    pub confirms_acked: u64,
    pub confirms_nacked: u64,
    pub messages_returned: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub errors: u64,
}

impl CounterSnapshot {
    /// Messages handed to the broker, successfully or not
    pub fn attempted(&self) -> u64 {
        self.messages_sent + self.publish_failures
    }

    /// Publishes with no ack or nack seen yet
    pub fn unconfirmed(&self) -> u64 {
        self.messages_sent
            .saturating_sub(self.confirms_acked + self.confirms_nacked)
    }

    pub fn log_producer_summary(&self) {
        info!(
            attempted = self.attempted(),
            sent = self.messages_sent,
            failed = self.publish_failures,
            acked = self.confirms_acked,
            nacked = self.confirms_nacked,
            returned = self.messages_returned,
            unconfirmed = self.unconfirmed(),
            bytes = self.bytes_sent,
            "Producer summary"
        );
    }

    pub fn log_consumer_summary(&self) {
        info!(
            received = self.messages_received,
            bytes = self.bytes_received,
            errors = self.errors,
            "Consumer summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = Counters::new();
        counters.inc_sent(100);
        counters.inc_sent(50);
        counters.inc_publish_failed();
        counters.inc_acked();
        counters.inc_returned();

        let snap = counters.snapshot();
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.bytes_sent, 150);
        assert_eq!(snap.attempted(), 3);
        assert_eq!(snap.unconfirmed(), 1);
        assert_eq!(snap.messages_returned, 1);
    }

    #[test]
    fn unconfirmed_never_underflows() {
        let counters = Counters::new();
        counters.inc_acked();
        counters.inc_nacked();
        assert_eq!(counters.snapshot().unconfirmed(), 0);
    }
}
