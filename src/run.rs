//! Run orchestration
//!
//! One invocation = one run: claim the run slot, walk the account list
//! in order, give each allowed account one bounded pipeline pass, and
//! log a separator after every account. The run marker is cleared on
//! every exit path through the guard's drop.

use crate::config::AccountConfig;
use crate::lock::{LockError, RunLock};
use crate::mailbox::Mailbox;
use crate::pipeline::{RelayPipeline, RunOutcome};
use crate::sink::MessageSink;
use crate::throttle::ReconnectThrottle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level driver for one batch run.
pub struct RunOrchestrator {
    lock: RunLock,
    throttle: ReconnectThrottle,
    mailbox: Arc<dyn Mailbox>,
    sink: Arc<dyn MessageSink>,
    deadline: Duration,
}

impl RunOrchestrator {
    #[must_use]
    pub fn new(
        lock: RunLock,
        throttle: ReconnectThrottle,
        mailbox: Arc<dyn Mailbox>,
        sink: Arc<dyn MessageSink>,
        deadline: Duration,
    ) -> Self {
        Self {
            lock,
            throttle,
            mailbox,
            sink,
            deadline,
        }
    }

    /// Execute one run over `accounts`, in list order.
    ///
    /// Problems are logged, never returned: a run always "completes"
    /// from the operator's point of view, and an overlapping invocation
    /// simply logs and leaves without touching any account.
    pub async fn run(&self, accounts: &[AccountConfig]) {
        let guard = match self.lock.acquire() {
            Ok(guard) => guard,
            Err(LockError::AlreadyRunning) => {
                info!("Already running; clear the run marker if this is a mistake");
                return;
            }
            Err(e) => {
                warn!("Could not claim the run slot: {e}");
                return;
            }
        };

        let pipeline = RelayPipeline::new(self.mailbox.as_ref(), self.sink.as_ref());

        for account in accounts {
            info!("{}: {}", account.host, account.username);

            match self.throttle.decide(
                &account.host,
                &account.username,
                account.min_interval_minutes,
            ) {
                Ok(true) => {
                    let outcome = pipeline.run(account, self.deadline).await;
                    self.log_outcome(&outcome);
                }
                Ok(false) => info!("Reconnect interval too short, skipping"),
                Err(e) => warn!("Throttle check failed, skipping: {e}"),
            }

            info!("==========");
        }

        guard.release();
    }

    fn log_outcome(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed(0) => {}
            RunOutcome::Completed(count) => info!("Relayed {} message(s)", count),
            RunOutcome::ConnectFailed(detail) => {
                warn!("Could not drain mailbox: {detail}");
            }
            RunOutcome::SoftDeny(detail) => {
                info!("Server reconnect limit hit: {detail}");
            }
            RunOutcome::StartTlsUnsupported => info!("starttls not implemented, yet"),
            RunOutcome::TimedOut => warn!(
                "Server did not respond within {} seconds",
                self.deadline.as_secs()
            ),
        }
    }
}
