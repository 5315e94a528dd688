use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{
    BillingItemType, EnrollmentRecord, EnrollmentStatus, OverdueItem, SubscriptionRecord, WorkOrder,
};
use super::store::{
    ChargeFeed, EnrollmentLookup, EnrollmentStore, StoreError, StoreResult, SubscriptionFeed,
};

/// key: billing-store-postgres -> sqlx-backed feeds and enrollment writes
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionFeed for PgBillingStore {
    async fn list_subscriptions(&self) -> StoreResult<Vec<SubscriptionRecord>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, customer_id, enrollment_id, status, active, amount_cents,
                   current_period_end, paused_reason, created_at
            FROM subscriptions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SubscriptionRecord::from).collect())
    }

    async fn subscription_for_customer(
        &self,
        customer_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, customer_id, enrollment_id, status, active, amount_cents,
                   current_period_end, paused_reason, created_at
            FROM subscriptions
            WHERE customer_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SubscriptionRecord::from))
    }

    async fn subscription_for_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, customer_id, enrollment_id, status, active, amount_cents,
                   current_period_end, paused_reason, created_at
            FROM subscriptions
            WHERE enrollment_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SubscriptionRecord::from))
    }
}

#[async_trait]
impl EnrollmentStore for PgBillingStore {
    async fn find_enrollments(
        &self,
        lookup: &EnrollmentLookup,
        statuses: &[EnrollmentStatus],
    ) -> StoreResult<Vec<EnrollmentRecord>> {
        let (enrollment_id, customer_id) = match lookup {
            EnrollmentLookup::ById(id) => (Some(*id), None),
            EnrollmentLookup::ByCustomer(customer_id) => (None, Some(customer_id.as_str())),
        };

        let rows = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT id, customer_id, status, submitted_at, reviewed_at, cancelled_at
            FROM enrollments
            WHERE ($1::uuid IS NULL OR id = $1)
              AND ($2::text IS NULL OR customer_id = $2)
              AND (cardinality($3::text[]) = 0 OR status = ANY($3))
            ORDER BY submitted_at DESC
            "#,
        )
        .bind(enrollment_id)
        .bind(customer_id)
        .bind(status_labels(statuses))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EnrollmentRecord::from).collect())
    }

    async fn transition_enrollment(
        &self,
        enrollment_id: Uuid,
        expected: &[EnrollmentStatus],
        next: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let stamp_column = match next {
            EnrollmentStatus::Active => "reviewed_at",
            EnrollmentStatus::Cancelled => "cancelled_at",
            other => return Err(StoreError::InvalidTransition(other)),
        };
        let sql = format!(
            r#"
            UPDATE enrollments
            SET status = $1, {stamp_column} = $2, updated_at = NOW()
            WHERE id = $3 AND status = ANY($4)
            "#
        );

        let result = sqlx::query(&sql)
            .bind(next.as_str())
            .bind(at)
            .bind(enrollment_id)
            .bind(status_labels(expected))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChargeFeed for PgBillingStore {
    async fn unpaid_work_orders(&self, customer_id: &str) -> StoreResult<Vec<WorkOrder>> {
        let rows = sqlx::query_as::<_, WorkOrderRow>(
            r#"
            SELECT id, customer_id, title, quoted_cost_cents, status, paid, paid_at,
                   completed_at, created_at
            FROM work_orders
            WHERE customer_id = $1 AND paid = FALSE
            ORDER BY created_at ASC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WorkOrder::from).collect())
    }

    async fn overdue_items(&self, customer_id: &str) -> StoreResult<Vec<OverdueItem>> {
        let rows = sqlx::query_as::<_, OverdueItemRow>(
            r#"
            SELECT id, customer_id, item_type, description, amount_cents, due_date, created_at
            FROM billing_overdue_items
            WHERE customer_id = $1 AND settled_at IS NULL
            ORDER BY due_date ASC NULLS LAST, created_at ASC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OverdueItem::from).collect())
    }
}

fn status_labels(statuses: &[EnrollmentStatus]) -> Vec<String> {
    statuses.iter().map(|status| status.as_str().to_string()).collect()
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    customer_id: Option<String>,
    enrollment_id: Option<Uuid>,
    status: String,
    active: bool,
    amount_cents: i64,
    current_period_end: Option<DateTime<Utc>>,
    paused_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            enrollment_id: row.enrollment_id,
            status: row.status.into(),
            active: row.active,
            amount_cents: row.amount_cents,
            current_period_end: row.current_period_end,
            paused_reason: row.paused_reason,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct EnrollmentRow {
    id: Uuid,
    customer_id: Option<String>,
    status: String,
    submitted_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl From<EnrollmentRow> for EnrollmentRecord {
    fn from(row: EnrollmentRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            status: row.status.into(),
            submitted_at: row.submitted_at,
            reviewed_at: row.reviewed_at,
            cancelled_at: row.cancelled_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct WorkOrderRow {
    id: Uuid,
    customer_id: String,
    title: String,
    quoted_cost_cents: Option<i64>,
    status: String,
    paid: bool,
    paid_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<WorkOrderRow> for WorkOrder {
    fn from(row: WorkOrderRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            title: row.title,
            quoted_cost_cents: row.quoted_cost_cents,
            status: row.status.into(),
            paid: row.paid,
            paid_at: row.paid_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct OverdueItemRow {
    id: Uuid,
    customer_id: String,
    item_type: String,
    description: String,
    amount_cents: i64,
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<OverdueItemRow> for OverdueItem {
    fn from(row: OverdueItemRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            item_type: BillingItemType::from_label(&row.item_type),
            description: row.description,
            amount_cents: row.amount_cents,
            due_date: row.due_date,
            created_at: row.created_at,
        }
    }
}
