use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::ExpirySweeper;
use crate::store::SignupStore;

/// Schedules [`ExpirySweeper::sweep`] on a fixed interval.
#[derive(Debug, Clone)]
pub struct ExpiryRunner {
    pub interval: Duration,
}

/// Handle for a running sweeper task (shutdown + trigger hook).
///
/// Dropping the handle stops the task at its next wake-up.
#[derive(Debug)]
pub struct ExpiryRunnerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl ExpiryRunnerHandle {
    /// Request an immediate sweep. Triggers that arrive while one is already
    /// pending are coalesced.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the task and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl ExpiryRunner {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the sweep loop on the current tokio runtime. The first sweep runs
    /// immediately.
    pub fn spawn<S: SignupStore>(&self, sweeper: Arc<ExpirySweeper<S>>) -> ExpiryRunnerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let trigger = Arc::new(Notify::new());
        let join = tokio::spawn(runner_loop(
            self.interval,
            sweeper,
            shutdown_rx,
            Arc::clone(&trigger),
        ));

        ExpiryRunnerHandle {
            shutdown: Some(shutdown_tx),
            trigger,
            join: Some(join),
        }
    }
}

async fn runner_loop<S: SignupStore>(
    interval: Duration,
    sweeper: Arc<ExpirySweeper<S>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    trigger: Arc<Notify>,
) {
    info!(interval_secs = interval.as_secs(), "expiry runner started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Shutdown has priority.
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
            _ = trigger.notified() => debug!("expiry sweep triggered"),
        }

        match sweeper.sweep(Utc::now()).await {
            Ok(report) if !report.failures.is_empty() => {
                error!(failed = report.failures.len(), "expiry sweep left registrations pending");
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "expiry sweep scan failed"),
        }
    }

    info!("expiry runner stopped");
}
