use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::models::ReconcileReport;
use super::reconciliation::Reconciler;

/// Why a reconciliation run was requested. Every trigger runs a full pass over the
/// subscription feed; `customer_id` only tags the run in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Scheduled,
    Manual,
    BillingStateChanged { customer_id: Option<String> },
}

/// key: billing-reconciliation-job -> queued run request
#[derive(Debug)]
pub struct ReconciliationJob {
    pub trigger: ReconcileTrigger,
    respond_to: Option<oneshot::Sender<ReconcileReport>>,
}

/// key: billing-reconciliation-handle -> enqueue interface
#[derive(Clone)]
pub struct ReconciliationHandle {
    sender: Sender<ReconciliationJob>,
}

impl ReconciliationHandle {
    /// Queues a run without waiting for it.
    pub async fn dispatch(&self, trigger: ReconcileTrigger) -> Result<()> {
        self.sender
            .send(ReconciliationJob {
                trigger,
                respond_to: None,
            })
            .await
            .map_err(|err| anyhow!("failed to enqueue billing reconciliation job: {err}"))
    }

    /// Queues a run and waits for its report.
    pub async fn run_now(&self, trigger: ReconcileTrigger) -> Result<ReconcileReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReconciliationJob {
                trigger,
                respond_to: Some(tx),
            })
            .await
            .map_err(|err| anyhow!("failed to enqueue billing reconciliation job: {err}"))?;
        rx.await
            .map_err(|_| anyhow!("billing reconciliation worker dropped the run"))
    }
}

/// Spawns the single consumer that executes reconciliation runs one at a time.
///
/// Requests that pile up while a run is in flight are answered by the next run
/// together, since every run reads the full subscription feed.
pub fn start_reconciliation_worker(reconciler: Reconciler) -> ReconciliationHandle {
    let (tx, rx) = channel(64);
    tokio::spawn(run_worker(reconciler, rx));
    ReconciliationHandle { sender: tx }
}

async fn run_worker(reconciler: Reconciler, mut rx: Receiver<ReconciliationJob>) {
    while let Some(job) = rx.recv().await {
        let mut batch = vec![job];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let triggers: Vec<_> = batch.iter().map(|job| job.trigger.clone()).collect();
        debug!(?triggers, "starting billing reconciliation run");

        let report = reconciler.reconcile(Utc::now()).await;
        log_report(&report);

        for job in batch {
            if let Some(respond_to) = job.respond_to {
                if respond_to.send(report.clone()).is_err() {
                    warn!(trigger = ?job.trigger, "reconciliation requester went away before the report was ready");
                }
            }
        }
    }
}

fn log_report(report: &ReconcileReport) {
    if !report.success {
        error!(
            errors = report.errors.len(),
            "billing reconciliation aborted before processing any subscription"
        );
    } else if !report.errors.is_empty() {
        warn!(
            updated = report.updated_count,
            errors = report.errors.len(),
            "billing reconciliation finished with per-record failures"
        );
    } else if report.converged() {
        debug!("billing reconciliation found enrollments already converged");
    } else {
        info!(
            updated = report.updated_count,
            "billing reconciliation finished"
        );
    }
}
