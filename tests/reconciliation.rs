use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use membership_billing::billing::{
    unify, EnrollmentRecord, EnrollmentStatus, InMemoryBillingStore, ReconcilePass, Reconciler,
    SubscriptionRecord, SubscriptionStatus,
};
use uuid::Uuid;

fn subscription(
    customer_id: Option<&str>,
    enrollment_id: Option<Uuid>,
    status: &str,
) -> SubscriptionRecord {
    SubscriptionRecord {
        id: Uuid::new_v4(),
        customer_id: customer_id.map(str::to_string),
        enrollment_id,
        status: status.into(),
        active: status == "active",
        amount_cents: 6_000,
        current_period_end: None,
        paused_reason: None,
        created_at: Utc::now(),
    }
}

fn enrollment(customer_id: &str, status: &str) -> EnrollmentRecord {
    EnrollmentRecord {
        id: Uuid::new_v4(),
        customer_id: Some(customer_id.to_string()),
        status: status.into(),
        submitted_at: Utc::now(),
        reviewed_at: None,
        cancelled_at: None,
    }
}

fn reconciler(store: &Arc<InMemoryBillingStore>, io_timeout: Duration) -> Reconciler {
    Reconciler::new(store.clone(), store.clone(), io_timeout)
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

// key: reconciliation-tests -> convergence,idempotence,partial failure
#[tokio::test]
async fn active_subscription_promotes_pending_enrollment() {
    let store = Arc::new(InMemoryBillingStore::new());
    let pending = enrollment("cust_a", "pending");
    store.insert_enrollment(pending.clone());
    store.insert_subscription(subscription(Some("cust_a"), None, "active"));

    let at = now();
    let report = reconciler(&store, Duration::from_secs(1)).reconcile(at).await;

    assert!(report.success);
    assert_eq!(report.updated_count, 1);
    assert!(report.errors.is_empty());

    let stored = store.enrollment(pending.id).unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Active);
    assert_eq!(stored.reviewed_at, Some(at));
    assert_eq!(stored.cancelled_at, None);
}

#[tokio::test]
async fn second_run_writes_nothing() {
    let store = Arc::new(InMemoryBillingStore::new());
    store.insert_enrollment(enrollment("cust_a", "approved"));
    store.insert_enrollment(enrollment("cust_b", "active"));
    store.insert_enrollment(enrollment("cust_c", "pending"));
    store.insert_subscription(subscription(Some("cust_a"), None, "active"));
    store.insert_subscription(subscription(Some("cust_b"), None, "past_due"));
    store.insert_subscription(subscription(Some("cust_c"), None, "trialing"));

    let reconciler = reconciler(&store, Duration::from_secs(1));
    let first = reconciler.reconcile(now()).await;
    assert_eq!(first.updated_count, 2);
    assert!(!first.converged());

    let second = reconciler.reconcile(now()).await;
    assert!(second.success);
    assert_eq!(second.updated_count, 0);
    assert!(second.converged());
}

#[tokio::test]
async fn lapsed_subscriptions_demote_only_active_enrollments() {
    let store = Arc::new(InMemoryBillingStore::new());
    let active = enrollment("cust_a", "active");
    let already_cancelled = enrollment("cust_b", "cancelled");
    let pending = enrollment("cust_c", "pending");
    for record in [&active, &already_cancelled, &pending] {
        store.insert_enrollment(record.clone());
    }
    store.insert_subscription(subscription(Some("cust_a"), None, "canceled"));
    store.insert_subscription(subscription(Some("cust_b"), None, "expired"));
    store.insert_subscription(subscription(Some("cust_c"), None, "past_due"));

    let at = now();
    let report = reconciler(&store, Duration::from_secs(1)).reconcile(at).await;
    assert_eq!(report.updated_count, 1);

    let demoted = store.enrollment(active.id).unwrap();
    assert_eq!(demoted.status, EnrollmentStatus::Cancelled);
    assert_eq!(demoted.cancelled_at, Some(at));

    let untouched = store.enrollment(already_cancelled.id).unwrap();
    assert_eq!(untouched.cancelled_at, None);
    assert_eq!(
        store.enrollment(pending.id).unwrap().status,
        EnrollmentStatus::Pending
    );
}

#[tokio::test]
async fn explicit_enrollment_link_wins_over_customer_lookup() {
    let store = Arc::new(InMemoryBillingStore::new());
    let linked = enrollment("cust_a", "pending");
    let sibling = enrollment("cust_a", "pending");
    store.insert_enrollment(linked.clone());
    store.insert_enrollment(sibling.clone());
    store.insert_subscription(subscription(Some("cust_a"), Some(linked.id), "active"));

    let report = reconciler(&store, Duration::from_secs(1))
        .reconcile(now())
        .await;

    assert_eq!(report.updated_count, 1);
    assert_eq!(
        store.enrollment(linked.id).unwrap().status,
        EnrollmentStatus::Active
    );
    assert_eq!(
        store.enrollment(sibling.id).unwrap().status,
        EnrollmentStatus::Pending
    );
}

#[tokio::test]
async fn unlinked_subscription_is_skipped_without_error() {
    let store = Arc::new(InMemoryBillingStore::new());
    store.insert_enrollment(enrollment("cust_a", "pending"));
    store.insert_subscription(subscription(None, None, "active"));

    let report = reconciler(&store, Duration::from_secs(1))
        .reconcile(now())
        .await;

    assert!(report.success);
    assert_eq!(report.updated_count, 0);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn failed_subscription_read_aborts_run() {
    let store = Arc::new(InMemoryBillingStore::new());
    let pending = enrollment("cust_a", "pending");
    store.insert_enrollment(pending.clone());
    store.insert_subscription(subscription(Some("cust_a"), None, "active"));
    store.fail_subscription_reads(true);

    let report = reconciler(&store, Duration::from_secs(1))
        .reconcile(now())
        .await;

    assert!(!report.success);
    assert_eq!(report.updated_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].pass, ReconcilePass::Load);
    assert_eq!(
        store.enrollment(pending.id).unwrap().status,
        EnrollmentStatus::Pending
    );
}

#[tokio::test]
async fn one_failing_write_does_not_block_the_rest() {
    let store = Arc::new(InMemoryBillingStore::new());
    let broken = enrollment("cust_a", "pending");
    let healthy = enrollment("cust_b", "pending");
    store.insert_enrollment(broken.clone());
    store.insert_enrollment(healthy.clone());
    let broken_subscription = subscription(Some("cust_a"), None, "active");
    store.insert_subscription(broken_subscription.clone());
    store.insert_subscription(subscription(Some("cust_b"), None, "active"));
    store.fail_enrollment_writes(broken.id);

    let reconciler = reconciler(&store, Duration::from_secs(1));
    let report = reconciler.reconcile(now()).await;

    assert!(report.success);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.errors.len(), 1);
    let failure = &report.errors[0];
    assert_eq!(failure.pass, ReconcilePass::Promote);
    assert_eq!(failure.subscription_id, Some(broken_subscription.id));
    assert_eq!(failure.enrollment_id, Some(broken.id));
    assert_eq!(failure.customer_id.as_deref(), Some("cust_a"));
    assert_eq!(
        store.enrollment(healthy.id).unwrap().status,
        EnrollmentStatus::Active
    );

    store.heal_enrollment(broken.id);
    let retry = reconciler.reconcile(now()).await;
    assert_eq!(retry.updated_count, 1);
    assert!(retry.errors.is_empty());
}

#[tokio::test]
async fn stalled_lookup_times_out_and_run_continues() {
    let store = Arc::new(InMemoryBillingStore::new());
    let healthy = enrollment("cust_b", "pending");
    store.insert_enrollment(enrollment("cust_slow", "pending"));
    store.insert_enrollment(healthy.clone());
    store.insert_subscription(subscription(Some("cust_slow"), None, "active"));
    store.insert_subscription(subscription(Some("cust_b"), None, "active"));
    store.stall_customer("cust_slow");

    let report = reconciler(&store, Duration::from_millis(50))
        .reconcile(now())
        .await;

    assert!(report.success);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].cause.contains("timed out"));
    assert_eq!(report.errors[0].enrollment_id, None);
    assert_eq!(
        store.enrollment(healthy.id).unwrap().status,
        EnrollmentStatus::Active
    );
}

#[tokio::test]
async fn cancelled_enrollment_is_not_repromoted() {
    let store = Arc::new(InMemoryBillingStore::new());
    let record = enrollment("cust_a", "active");
    store.insert_enrollment(record.clone());
    let mut sub = subscription(Some("cust_a"), None, "canceled");
    store.insert_subscription(sub.clone());

    let reconciler = reconciler(&store, Duration::from_secs(1));
    reconciler.reconcile(now()).await;
    assert_eq!(
        store.enrollment(record.id).unwrap().status,
        EnrollmentStatus::Cancelled
    );

    // promote only touches pending/approved enrollments
    sub.status = SubscriptionStatus::Active;
    sub.active = true;
    store.update_subscription(sub);
    let report = reconciler.reconcile(now()).await;
    assert_eq!(report.updated_count, 0);
}

#[tokio::test]
async fn stored_state_agrees_with_unifier_after_reconciliation() {
    let store = Arc::new(InMemoryBillingStore::new());
    let cases = [
        ("cust_1", "active", "pending"),
        ("cust_2", "active", "approved"),
        ("cust_3", "canceled", "active"),
        ("cust_4", "expired", "active"),
        ("cust_5", "past_due", "active"),
    ];
    let mut ids = Vec::new();
    for (customer, subscription_status, enrollment_status) in cases {
        let record = enrollment(customer, enrollment_status);
        ids.push((record.id, subscription_status));
        store.insert_enrollment(record);
        store.insert_subscription(subscription(Some(customer), None, subscription_status));
    }

    let report = reconciler(&store, Duration::from_secs(1))
        .reconcile(now())
        .await;
    assert_eq!(report.updated_count, cases.len());

    for (id, subscription_status) in ids {
        let stored = store.enrollment(id).unwrap();
        let unified = unify(
            Some(&SubscriptionStatus::from(subscription_status)),
            Some(&stored.status),
        );
        assert_eq!(unified.as_str(), stored.status.as_str());
    }
}

#[tokio::test]
async fn older_lapsed_subscription_does_not_undo_promotion() {
    let store = Arc::new(InMemoryBillingStore::new());
    let pending = enrollment("cust_a", "pending");
    store.insert_enrollment(pending.clone());
    store.insert_subscription(subscription(Some("cust_a"), None, "canceled"));
    store.insert_subscription(subscription(Some("cust_a"), None, "active"));

    let reconciler = reconciler(&store, Duration::from_secs(1));
    let first = reconciler.reconcile(now()).await;
    assert!(first.success);
    assert_eq!(first.updated_count, 1);

    let stored = store.enrollment(pending.id).unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Active);
    assert!(stored.reviewed_at.is_some());
    assert_eq!(stored.cancelled_at, None);
    assert_eq!(
        unify(Some(&SubscriptionStatus::Active), Some(&stored.status)).as_str(),
        stored.status.as_str()
    );

    let second = reconciler.reconcile(now()).await;
    assert!(second.converged());
    assert_eq!(
        store.enrollment(pending.id).unwrap().status,
        EnrollmentStatus::Active
    );
}

#[tokio::test]
async fn active_enrollment_kept_while_customer_holds_live_subscription() {
    let store = Arc::new(InMemoryBillingStore::new());
    let active = enrollment("cust_a", "active");
    let linked = enrollment("cust_b", "active");
    store.insert_enrollment(active.clone());
    store.insert_enrollment(linked.clone());
    store.insert_subscription(subscription(Some("cust_a"), None, "active"));
    store.insert_subscription(subscription(Some("cust_a"), None, "past_due"));
    store.insert_subscription(subscription(None, Some(linked.id), "active"));
    store.insert_subscription(subscription(Some("cust_b"), None, "expired"));

    let report = reconciler(&store, Duration::from_secs(1))
        .reconcile(now())
        .await;

    assert!(report.success);
    assert_eq!(report.updated_count, 0);
    assert!(report.errors.is_empty());
    for id in [active.id, linked.id] {
        let stored = store.enrollment(id).unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Active);
        assert_eq!(stored.cancelled_at, None);
    }
}
