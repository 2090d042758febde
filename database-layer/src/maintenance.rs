//! Periodic background jobs (expired-window sweeps, log retention)
//!
//! Each job runs on its own `tokio` interval, independent of request
//! handling, until its [`PeriodicTask`] handle is shut down.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Handle to a running periodic job
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the job to stop and wait for the current run to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(task = self.name, error = %e, "Periodic task ended abnormally");
        }
    }
}

/// Run `job` immediately and then once every `period`
///
/// The job reports how many rows it touched; failures are logged and the
/// schedule continues.
pub fn spawn_periodic<F, Fut, E>(name: &'static str, period: Duration, mut job: F) -> PeriodicTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    // `tokio::time::interval` rejects a zero period
    let period = period.max(Duration::from_millis(1));
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(task = name, period_secs = period.as_secs_f64(), "Periodic task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match job().await {
                        Ok(affected) => debug!(task = name, affected, "Periodic task run complete"),
                        Err(e) => error!(task = name, error = %e, "Periodic task run failed"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(task = name, "Periodic task stopped");
    });

    PeriodicTask {
        name,
        shutdown,
        task,
    }
}
