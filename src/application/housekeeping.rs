//! Periodic housekeeping.
//!
//! Opportunistic sweeps only run when traffic arrives. Services with sparse
//! traffic can spawn this task to reclaim counters and closed groups on a
//! fixed interval instead.

use crate::application::error::BuildError;
use crate::application::ports::Housekeeper;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Error returned when the housekeeping task does not stop cleanly.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The task panicked or was cancelled
    #[error("housekeeping task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Handle to a running housekeeping task.
///
/// Dropping the handle also stops the task, but only `shutdown()` waits for it.
#[derive(Debug)]
pub struct HousekeepingHandle {
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl HousekeepingHandle {
    /// Stop the task and wait for it to finish.
    ///
    /// # Errors
    /// Returns `ShutdownError::TaskFailed` if the task panicked.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        // The task may already be gone; the join below reports how it ended
        let _ = self.shutdown_tx.send(());
        self.join.await?;
        Ok(())
    }

    /// Whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn a task sweeping every housekeeper once per `every`.
///
/// The first sweep happens one full interval after spawning. Must be called
/// from within a tokio runtime.
///
/// # Example
/// ```
/// use interaction_throttle::{spawn_housekeeping, AdmissionLimiter, EventAggregator, Housekeeper};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = AdmissionLimiter::builder().build().unwrap();
/// let aggregator = EventAggregator::builder().build().unwrap();
///
/// let housekeepers: Vec<Arc<dyn Housekeeper>> =
///     vec![Arc::new(limiter.clone()), Arc::new(aggregator.clone())];
/// let handle = spawn_housekeeping(Duration::from_secs(60), housekeepers).unwrap();
///
/// handle.shutdown().await.unwrap();
/// # }
/// ```
///
/// # Errors
/// Returns `BuildError::ZeroHousekeepingInterval` if `every` is zero.
pub fn spawn_housekeeping(
    every: Duration,
    housekeepers: Vec<Arc<dyn Housekeeper>>,
) -> Result<HousekeepingHandle, BuildError> {
    if every.is_zero() {
        return Err(BuildError::ZeroHousekeepingInterval);
    }

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => sweep_all(&housekeepers),
            }
        }

        debug!("housekeeping task stopped");
    });

    Ok(HousekeepingHandle { shutdown_tx, join })
}

fn sweep_all(housekeepers: &[Arc<dyn Housekeeper>]) {
    for housekeeper in housekeepers {
        let removed = housekeeper.sweep();
        debug!(component = housekeeper.name(), removed, "housekeeping sweep");
    }
}
