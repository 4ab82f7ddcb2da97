//! Periodic reconciliation.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::coordinator::SyncCoordinator;
use super::remote::RemoteApi;

/// Interval between reconciliation ticks when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Handle on a running poll loop.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stops scheduling new ticks. A tick already in flight runs to
    /// completion.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Starts reconciling every `interval`, beginning immediately.
///
/// Returns `None` when the coordinator has no token. Each tick runs in its
/// own task, so a slow tick never delays the next one; failures are logged
/// and leave sync state untouched.
pub fn spawn_reconciliation<R>(
    coordinator: Arc<SyncCoordinator<R>>,
    interval: Duration,
) -> Option<PollHandle>
where
    R: RemoteApi + 'static,
{
    if !coordinator.is_authenticated() {
        tracing::info!("No sync token configured, reconciliation disabled");
        return None;
    }

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                match coordinator.reconcile().await {
                    Ok(report) if !report.changed.is_empty() => {
                        tracing::info!("Reconciled: {} book(s) changed state", report.changed.len());
                    }
                    Ok(_) => tracing::debug!("Reconciled: nothing changed"),
                    Err(e) => tracing::warn!("Reconciliation failed: {}", e),
                }
            });
        }
    });

    tracing::info!("Reconciling every {}s", interval.as_secs());
    Some(PollHandle { task })
}
