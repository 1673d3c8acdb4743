use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Exit status after a second Ctrl-C
const FORCED_EXIT_CODE: i32 = 130;

/// How a deliberate wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Interrupted,
}

/// Run-wide interrupt flag. Once triggered it stays triggered, and every
/// wait that follows returns at once.
#[derive(Debug, Clone)]
pub struct Interrupt {
    state: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn trigger(&self) {
        self.state.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.borrow()
    }

    async fn triggered(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Install the only Ctrl-C handler of the run. The first press triggers
    /// the flag; a second one exits the process.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Ctrl-C handler unavailable");
                return;
            }
            warn!("Interrupted, skipping remaining iterations. Press Ctrl-C again to abort");
            interrupt.trigger();

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Interrupted twice, aborting");
                std::process::exit(FORCED_EXIT_CODE);
            }
        })
    }
}

/// Sleep for `duration`, or until the run is interrupted. Interruption is
/// logged and the caller carries on with its next step; it is never an error.
pub async fn pause(duration: Duration, what: &str, interrupt: &Interrupt) -> WaitOutcome {
    if interrupt.is_triggered() {
        debug!(what, "Wait skipped, run interrupted");
        return WaitOutcome::Interrupted;
    }
    debug!(what, duration = ?duration, "Wait started");

    tokio::select! {
        _ = sleep(duration) => {
            debug!(what, "Wait finished");
            WaitOutcome::Elapsed
        }
        _ = interrupt.triggered() => {
            warn!(what, "Wait interrupted, moving on");
            WaitOutcome::Interrupted
        }
    }
}
