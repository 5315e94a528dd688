use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::models::{EnrollmentRecord, EnrollmentStatus, OverdueItem, SubscriptionRecord, WorkOrder};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u128,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("enrollments cannot be transitioned to `{0}`")]
    InvalidTransition(EnrollmentStatus),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How a subscription points at its enrollment(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentLookup {
    ById(Uuid),
    ByCustomer(String),
}

impl EnrollmentLookup {
    /// An explicit enrollment link wins over the shared customer identifier.
    pub fn for_subscription(subscription: &SubscriptionRecord) -> Option<Self> {
        if let Some(enrollment_id) = subscription.enrollment_id {
            return Some(Self::ById(enrollment_id));
        }
        subscription
            .customer_id
            .as_deref()
            .map(str::trim)
            .filter(|customer_id| !customer_id.is_empty())
            .map(|customer_id| Self::ByCustomer(customer_id.to_string()))
    }
}

/// key: subscription-feed -> payment processor records, read-only
#[async_trait]
pub trait SubscriptionFeed: Send + Sync {
    async fn list_subscriptions(&self) -> StoreResult<Vec<SubscriptionRecord>>;

    /// Most recently updated subscription for the customer, if any.
    async fn subscription_for_customer(
        &self,
        customer_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Most recently updated subscription linked to this enrollment, for records the
    /// provider keyed by enrollment rather than customer.
    async fn subscription_for_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> StoreResult<Option<SubscriptionRecord>>;
}

/// key: enrollment-store -> the only records this engine writes
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Enrollments matching `lookup` whose status is one of `statuses`. An empty
    /// `statuses` slice matches every status.
    async fn find_enrollments(
        &self,
        lookup: &EnrollmentLookup,
        statuses: &[EnrollmentStatus],
    ) -> StoreResult<Vec<EnrollmentRecord>>;

    /// Compare-and-set: moves the enrollment to `next` only while its status is still
    /// one of `expected`, stamping `reviewed_at` (active) or `cancelled_at`
    /// (cancelled) with `at`. Returns whether a row changed.
    async fn transition_enrollment(
        &self,
        enrollment_id: Uuid,
        expected: &[EnrollmentStatus],
        next: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// key: charge-feed -> one-off work and flat fees for the ledger
#[async_trait]
pub trait ChargeFeed: Send + Sync {
    async fn unpaid_work_orders(&self, customer_id: &str) -> StoreResult<Vec<WorkOrder>>;

    async fn overdue_items(&self, customer_id: &str) -> StoreResult<Vec<OverdueItem>>;
}
