use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

use crate::config;

use super::worker::{ReconcileTrigger, ReconciliationHandle};

/// key: billing-reconcile-scheduler -> periodic convergence runs
pub fn spawn(handle: ReconciliationHandle) -> JoinHandle<()> {
    spawn_with_interval(
        handle,
        Duration::from_secs(*config::BILLING_RECONCILE_INTERVAL_SECS),
    )
}

pub fn spawn_with_interval(handle: ReconciliationHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !*config::BILLING_RECONCILE_ON_START {
            ticker.tick().await;
        }
        loop {
            ticker.tick().await;
            if let Err(err) = handle.dispatch(ReconcileTrigger::Scheduled).await {
                warn!(?err, "billing reconciliation tick could not be queued");
                break;
            }
        }
    })
}
