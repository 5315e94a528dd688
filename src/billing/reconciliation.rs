use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::{
    EnrollmentRecord, EnrollmentStatus, ReconcileFailure, ReconcilePass, ReconcileReport, SubscriptionRecord,
    SubscriptionStatus,
};
use super::store::{EnrollmentLookup, EnrollmentStore, StoreError, StoreResult, SubscriptionFeed};

const PROMOTABLE: &[EnrollmentStatus] = &[EnrollmentStatus::Pending, EnrollmentStatus::Approved];
const DEMOTABLE: &[EnrollmentStatus] = &[EnrollmentStatus::Active];

/// One guarded status move: only enrollments still in `from` are touched.
struct Transition {
    pass: ReconcilePass,
    from: &'static [EnrollmentStatus],
    to: EnrollmentStatus,
}

/// Customers and enrollments that still have an `active` subscription in the feed.
/// A lapsed subscription never demotes anything covered here.
#[derive(Default)]
struct LiveLinks {
    customers: HashSet<String>,
    enrollments: HashSet<Uuid>,
}

impl LiveLinks {
    fn from_feed(subscriptions: &[SubscriptionRecord]) -> Self {
        let mut live = Self::default();
        for subscription in subscriptions
            .iter()
            .filter(|record| record.status == SubscriptionStatus::Active)
        {
            if let Some(enrollment_id) = subscription.enrollment_id {
                live.enrollments.insert(enrollment_id);
            }
            if let Some(customer_id) = normalized_customer(subscription.customer_id.as_deref()) {
                live.customers.insert(customer_id.to_string());
            }
        }
        live
    }

    fn covers(&self, enrollment: &EnrollmentRecord) -> bool {
        self.enrollments.contains(&enrollment.id)
            || normalized_customer(enrollment.customer_id.as_deref())
                .map_or(false, |customer_id| self.customers.contains(customer_id))
    }
}

fn normalized_customer(customer_id: Option<&str>) -> Option<&str> {
    customer_id
        .map(str::trim)
        .filter(|customer_id| !customer_id.is_empty())
}

/// Per-run bookkeeping shared by both passes.
struct RunState {
    report: ReconcileReport,
    touched: HashSet<Uuid>,
    live: LiveLinks,
}

/// key: billing-reconciliation -> converge stored enrollments toward the unified status
///
/// Runs two passes over the subscription feed: live subscriptions promote
/// pending/approved enrollments to active, lapsed ones demote active enrollments to
/// cancelled. Every write is a compare-and-set on the pre-state, so overlapping runs
/// degrade to no-ops and a second run over unchanged input writes nothing.
///
/// An enrollment moves at most once per run, and a customer who still holds an
/// active subscription is never demoted because of an older lapsed one.
///
/// Only a failed subscription read aborts a run. Per-record lookup or write failures,
/// timeouts included, are collected in the report and the loop moves on.
#[derive(Clone)]
pub struct Reconciler {
    subscriptions: Arc<dyn SubscriptionFeed>,
    enrollments: Arc<dyn EnrollmentStore>,
    io_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionFeed>,
        enrollments: Arc<dyn EnrollmentStore>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            enrollments,
            io_timeout,
        }
    }

    pub async fn reconcile(&self, now: DateTime<Utc>) -> ReconcileReport {
        let subscriptions = match self
            .guarded("list subscriptions", self.subscriptions.list_subscriptions())
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                error!(?err, "billing reconciliation could not load subscriptions");
                return ReconcileReport {
                    success: false,
                    updated_count: 0,
                    errors: vec![ReconcileFailure {
                        pass: ReconcilePass::Load,
                        subscription_id: None,
                        enrollment_id: None,
                        customer_id: None,
                        cause: err.to_string(),
                    }],
                };
            }
        };

        let mut run = RunState {
            report: ReconcileReport {
                success: true,
                ..ReconcileReport::default()
            },
            touched: HashSet::new(),
            live: LiveLinks::from_feed(&subscriptions),
        };

        let promote = Transition {
            pass: ReconcilePass::Promote,
            from: PROMOTABLE,
            to: EnrollmentStatus::Active,
        };
        for subscription in subscriptions
            .iter()
            .filter(|record| record.status == SubscriptionStatus::Active)
        {
            self.converge(subscription, &promote, now, &mut run).await;
        }

        let demote = Transition {
            pass: ReconcilePass::Demote,
            from: DEMOTABLE,
            to: EnrollmentStatus::Cancelled,
        };
        for subscription in subscriptions
            .iter()
            .filter(|record| record.status.is_lapsed())
        {
            self.converge(subscription, &demote, now, &mut run).await;
        }

        run.report
    }

    async fn converge(
        &self,
        subscription: &SubscriptionRecord,
        transition: &Transition,
        now: DateTime<Utc>,
        run: &mut RunState,
    ) {
        let Some(lookup) = EnrollmentLookup::for_subscription(subscription) else {
            debug!(
                subscription = %subscription.id,
                "subscription has no enrollment link or customer id; skipping"
            );
            return;
        };

        let candidates = match self
            .guarded(
                "find enrollments",
                self.enrollments.find_enrollments(&lookup, transition.from),
            )
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(
                    ?err,
                    subscription = %subscription.id,
                    pass = ?transition.pass,
                    "failed to look up enrollments for subscription"
                );
                run.report
                    .errors
                    .push(failure(transition.pass, subscription, None, &err));
                return;
            }
        };

        for enrollment in candidates {
            if run.touched.contains(&enrollment.id) {
                debug!(
                    enrollment = %enrollment.id,
                    pass = ?transition.pass,
                    "enrollment already moved this run"
                );
                continue;
            }
            if transition.pass == ReconcilePass::Demote && run.live.covers(&enrollment) {
                debug!(
                    subscription = %subscription.id,
                    enrollment = %enrollment.id,
                    "customer still holds an active subscription; not demoting"
                );
                continue;
            }

            let outcome = self
                .guarded(
                    "transition enrollment",
                    self.enrollments.transition_enrollment(
                        enrollment.id,
                        transition.from,
                        transition.to.clone(),
                        now,
                    ),
                )
                .await;

            match outcome {
                Ok(true) => {
                    run.touched.insert(enrollment.id);
                    run.report.updated_count += 1;
                    info!(
                        subscription = %subscription.id,
                        enrollment = %enrollment.id,
                        from = %enrollment.status,
                        to = %transition.to,
                        "enrollment status reconciled"
                    );
                }
                Ok(false) => debug!(
                    enrollment = %enrollment.id,
                    "enrollment left its expected status before the write; next run will pick it up"
                ),
                Err(err) => {
                    warn!(
                        ?err,
                        subscription = %subscription.id,
                        enrollment = %enrollment.id,
                        to = %transition.to,
                        "failed to transition enrollment"
                    );
                    run.report.errors.push(failure(
                        transition.pass,
                        subscription,
                        Some(enrollment.id),
                        &err,
                    ));
                }
            }
        }
    }

    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match timeout(self.io_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                after_ms: self.io_timeout.as_millis(),
            }),
        }
    }
}

fn failure(
    pass: ReconcilePass,
    subscription: &SubscriptionRecord,
    enrollment_id: Option<Uuid>,
    err: &StoreError,
) -> ReconcileFailure {
    ReconcileFailure {
        pass,
        subscription_id: Some(subscription.id),
        enrollment_id,
        customer_id: subscription.customer_id.clone(),
        cause: err.to_string(),
    }
}
