use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{EnrollmentRecord, EnrollmentStatus, OverdueItem, SubscriptionRecord, WorkOrder};
use super::store::{
    ChargeFeed, EnrollmentLookup, EnrollmentStore, StoreError, StoreResult, SubscriptionFeed,
};

/// key: billing-store-memory -> mutex-guarded store with failure injection
///
/// Backs local dry runs and tests. Subscriptions are returned in insertion order;
/// `subscription_for_customer` returns the most recently inserted match.
#[derive(Default)]
pub struct InMemoryBillingStore {
    subscriptions: Mutex<Vec<SubscriptionRecord>>,
    enrollments: Mutex<Vec<EnrollmentRecord>>,
    work_orders: Mutex<Vec<WorkOrder>>,
    overdue_items: Mutex<Vec<OverdueItem>>,
    fail_subscription_reads: AtomicBool,
    fail_work_order_reads: AtomicBool,
    fail_overdue_reads: AtomicBool,
    failing_enrollments: Mutex<HashSet<Uuid>>,
    stalled_customers: Mutex<HashSet<String>>,
}

const STALL: Duration = Duration::from_secs(30);

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_subscription(&self, record: SubscriptionRecord) {
        lock(&self.subscriptions).push(record);
    }

    /// Replaces the stored subscription with the same id, as a provider webhook would.
    pub fn update_subscription(&self, record: SubscriptionRecord) {
        let mut subscriptions = lock(&self.subscriptions);
        match subscriptions.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record,
            None => subscriptions.push(record),
        }
    }

    pub fn insert_enrollment(&self, record: EnrollmentRecord) {
        lock(&self.enrollments).push(record);
    }

    pub fn insert_work_order(&self, order: WorkOrder) {
        lock(&self.work_orders).push(order);
    }

    pub fn insert_overdue_item(&self, item: OverdueItem) {
        lock(&self.overdue_items).push(item);
    }

    pub fn enrollment(&self, enrollment_id: Uuid) -> Option<EnrollmentRecord> {
        lock(&self.enrollments)
            .iter()
            .find(|record| record.id == enrollment_id)
            .cloned()
    }

    /// Every subscription read fails with [`StoreError::Unavailable`] while set.
    pub fn fail_subscription_reads(&self, fail: bool) {
        self.fail_subscription_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_work_order_reads(&self, fail: bool) {
        self.fail_work_order_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_overdue_reads(&self, fail: bool) {
        self.fail_overdue_reads.store(fail, Ordering::SeqCst);
    }

    /// Writes to this enrollment fail until [`Self::heal_enrollment`] is called.
    pub fn fail_enrollment_writes(&self, enrollment_id: Uuid) {
        lock(&self.failing_enrollments).insert(enrollment_id);
    }

    pub fn heal_enrollment(&self, enrollment_id: Uuid) {
        lock(&self.failing_enrollments).remove(&enrollment_id);
    }

    /// Enrollment lookups for this customer hang long enough to trip any sane timeout.
    pub fn stall_customer(&self, customer_id: impl Into<String>) {
        lock(&self.stalled_customers).insert(customer_id.into());
    }

    fn check_subscription_reads(&self) -> StoreResult<()> {
        if self.fail_subscription_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "subscription feed unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn is_stalled(&self, lookup: &EnrollmentLookup) -> bool {
        let EnrollmentLookup::ByCustomer(customer_id) = lookup else {
            return false;
        };
        lock(&self.stalled_customers).contains(customer_id)
    }
}

#[async_trait]
impl SubscriptionFeed for InMemoryBillingStore {
    async fn list_subscriptions(&self) -> StoreResult<Vec<SubscriptionRecord>> {
        self.check_subscription_reads()?;
        Ok(lock(&self.subscriptions).clone())
    }

    async fn subscription_for_customer(
        &self,
        customer_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.check_subscription_reads()?;
        Ok(lock(&self.subscriptions)
            .iter()
            .rev()
            .find(|record| record.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn subscription_for_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.check_subscription_reads()?;
        Ok(lock(&self.subscriptions)
            .iter()
            .rev()
            .find(|record| record.enrollment_id == Some(enrollment_id))
            .cloned())
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryBillingStore {
    async fn find_enrollments(
        &self,
        lookup: &EnrollmentLookup,
        statuses: &[EnrollmentStatus],
    ) -> StoreResult<Vec<EnrollmentRecord>> {
        if self.is_stalled(lookup) {
            tokio::time::sleep(STALL).await;
        }

        let matches: Vec<_> = lock(&self.enrollments)
            .iter()
            .filter(|record| match lookup {
                EnrollmentLookup::ById(id) => record.id == *id,
                EnrollmentLookup::ByCustomer(customer_id) => {
                    record.customer_id.as_deref() == Some(customer_id.as_str())
                }
            })
            .filter(|record| statuses.is_empty() || statuses.contains(&record.status))
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn transition_enrollment(
        &self,
        enrollment_id: Uuid,
        expected: &[EnrollmentStatus],
        next: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if !matches!(next, EnrollmentStatus::Active | EnrollmentStatus::Cancelled) {
            return Err(StoreError::InvalidTransition(next));
        }
        if lock(&self.failing_enrollments).contains(&enrollment_id) {
            return Err(StoreError::Unavailable(format!(
                "write to enrollment {enrollment_id} rejected"
            )));
        }

        let mut enrollments = lock(&self.enrollments);
        let Some(record) = enrollments
            .iter_mut()
            .find(|record| record.id == enrollment_id && expected.contains(&record.status))
        else {
            return Ok(false);
        };

        match next {
            EnrollmentStatus::Active => record.reviewed_at = Some(at),
            _ => record.cancelled_at = Some(at),
        }
        record.status = next;
        Ok(true)
    }
}

#[async_trait]
impl ChargeFeed for InMemoryBillingStore {
    async fn unpaid_work_orders(&self, customer_id: &str) -> StoreResult<Vec<WorkOrder>> {
        if self.fail_work_order_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("work-order feed unreachable".to_string()));
        }
        Ok(lock(&self.work_orders)
            .iter()
            .filter(|order| order.customer_id == customer_id && !order.paid)
            .cloned()
            .collect())
    }

    async fn overdue_items(&self, customer_id: &str) -> StoreResult<Vec<OverdueItem>> {
        if self.fail_overdue_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("overdue-item feed unreachable".to_string()));
        }
        Ok(lock(&self.overdue_items)
            .iter()
            .filter(|item| item.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
