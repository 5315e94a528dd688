use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use membership_billing::billing::{
    BillingService, EnrollmentLookup, EnrollmentStatus, EnrollmentStore, PgBillingStore,
    Reconciler, SnapshotStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

async fn insert_enrollment(pool: &PgPool, customer_id: &str, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO enrollments (id, customer_id, status) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(customer_id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_subscription(
    pool: &PgPool,
    customer_id: Option<&str>,
    enrollment_id: Option<Uuid>,
    status: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO subscriptions (id, customer_id, enrollment_id, status, amount_cents) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(customer_id)
    .bind(enrollment_id)
    .bind(status)
    .bind(6_000_i64)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn enrollment_state(
    pool: &PgPool,
    id: Uuid,
) -> (String, Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    sqlx::query_as("SELECT status, reviewed_at, cancelled_at FROM enrollments WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

// key: billing-postgres-tests -> guarded writes,convergence
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn reconcile_promotes_and_demotes(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let pending = insert_enrollment(&pool, "cust_a", "pending").await;
    let active = insert_enrollment(&pool, "cust_b", "active").await;
    let linked = insert_enrollment(&pool, "cust_c", "approved").await;
    insert_subscription(&pool, Some("cust_a"), None, "active").await;
    insert_subscription(&pool, Some("cust_b"), None, "past_due").await;
    insert_subscription(&pool, None, Some(linked), "active").await;
    insert_subscription(&pool, None, None, "active").await;

    let store = Arc::new(PgBillingStore::new(pool.clone()));
    let reconciler = Reconciler::new(store.clone(), store, Duration::from_secs(5));

    let report = reconciler.reconcile(Utc::now()).await;
    assert!(report.success);
    assert_eq!(report.updated_count, 3);
    assert!(report.errors.is_empty());

    let (status, reviewed_at, _) = enrollment_state(&pool, pending).await;
    assert_eq!(status, "active");
    assert!(reviewed_at.is_some());

    let (status, _, cancelled_at) = enrollment_state(&pool, active).await;
    assert_eq!(status, "cancelled");
    assert!(cancelled_at.is_some());

    let (status, _, _) = enrollment_state(&pool, linked).await;
    assert_eq!(status, "active");

    let second = reconciler.reconcile(Utc::now()).await;
    assert!(second.converged());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn transition_is_compare_and_set(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let id = insert_enrollment(&pool, "cust_a", "cancelled").await;
    let store = PgBillingStore::new(pool.clone());

    let changed = store
        .transition_enrollment(
            id,
            &[EnrollmentStatus::Pending, EnrollmentStatus::Approved],
            EnrollmentStatus::Active,
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(!changed);

    let found = store
        .find_enrollments(
            &EnrollmentLookup::ByCustomer("cust_a".into()),
            &[EnrollmentStatus::Active],
        )
        .await
        .unwrap();
    assert!(found.is_empty());

    let (status, reviewed_at, _) = enrollment_state(&pool, id).await;
    assert_eq!(status, "cancelled");
    assert!(reviewed_at.is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn summary_reads_charge_tables(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    sqlx::query(
        "INSERT INTO work_orders (id, customer_id, title, quoted_cost_cents, status, paid) VALUES ($1, $2, $3, $4, 'completed', FALSE)",
    )
    .bind(Uuid::new_v4())
    .bind("cust_a")
    .bind("Deck staining")
    .bind(15_000_i64)
    .execute(&pool)
    .await
    .unwrap();

    let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
    sqlx::query(
        "INSERT INTO billing_overdue_items (id, customer_id, item_type, description, amount_cents, due_date) VALUES ($1, $2, 'maintenance', $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind("cust_a")
    .bind("Spring maintenance")
    .bind(3_000_i64)
    .bind(today.pred_opt().unwrap())
    .execute(&pool)
    .await
    .unwrap();

    let service = BillingService::from_store(Arc::new(PgBillingStore::new(pool.clone())));
    let summary = service.summary("cust_a", today).await.unwrap();

    assert_eq!(summary.past_due_items.len(), 1);
    assert_eq!(summary.due_now_items.len(), 1);
    assert_eq!(summary.totals.past_due_cents, 3_000);
    assert_eq!(summary.totals.due_now_cents, 18_000);
    assert_eq!(summary.totals.total_owed_cents, 18_000);
    assert_eq!(summary.subscription.status, SnapshotStatus::None);
    assert_eq!(summary.days_until_next_payment, None);
}
