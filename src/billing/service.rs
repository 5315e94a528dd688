use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use super::ledger;
use super::models::{BillingSummary, EnrollmentRecord, MembershipView, SubscriptionRecord};
use super::status;
use super::store::{ChargeFeed, EnrollmentLookup, EnrollmentStore, StoreResult, SubscriptionFeed};

/// key: billing-service -> read path over the feeds, no writes
#[derive(Clone)]
pub struct BillingService {
    subscriptions: Arc<dyn SubscriptionFeed>,
    enrollments: Arc<dyn EnrollmentStore>,
    charges: Arc<dyn ChargeFeed>,
}

impl BillingService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionFeed>,
        enrollments: Arc<dyn EnrollmentStore>,
        charges: Arc<dyn ChargeFeed>,
    ) -> Self {
        Self {
            subscriptions,
            enrollments,
            charges,
        }
    }

    /// Wires every feed to one store that implements all of them.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: SubscriptionFeed + EnrollmentStore + ChargeFeed + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    /// Billing view for one customer. Any feed that cannot be read degrades to an
    /// empty source plus a warning note, so the caller still gets whatever totals
    /// the remaining feeds support.
    pub async fn summary(&self, customer_id: &str, today: NaiveDate) -> StoreResult<BillingSummary> {
        let mut notes = Vec::new();

        let work_orders = match self.charges.unpaid_work_orders(customer_id).await {
            Ok(work_orders) => work_orders,
            Err(err) => {
                warn!(?err, %customer_id, "work-order feed unavailable; summarizing without it");
                notes.push("billing:work-orders-unavailable");
                Vec::new()
            }
        };
        let overdue_items = match self.charges.overdue_items(customer_id).await {
            Ok(overdue_items) => overdue_items,
            Err(err) => {
                warn!(?err, %customer_id, "overdue-item feed unavailable; summarizing without it");
                notes.push("billing:overdue-items-unavailable");
                Vec::new()
            }
        };

        let enrollment = match self.latest_enrollment(customer_id).await {
            Ok(enrollment) => enrollment,
            Err(err) => {
                warn!(?err, %customer_id, "enrollment lookup failed; subscription resolved by customer only");
                None
            }
        };
        let subscription = match self.resolve_subscription(customer_id, enrollment.as_ref()).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(?err, %customer_id, "subscription feed unavailable; summarizing without it");
                notes.push("billing:subscription-unavailable");
                None
            }
        };

        let mut summary =
            ledger::aggregate(&work_orders, subscription.as_ref(), &overdue_items, today);
        summary
            .warnings
            .extend(notes.into_iter().map(str::to_string));
        Ok(summary)
    }

    pub async fn membership(&self, customer_id: &str) -> StoreResult<MembershipView> {
        let enrollment = self.latest_enrollment(customer_id).await?;
        let subscription = self
            .resolve_subscription(customer_id, enrollment.as_ref())
            .await?;

        let subscription_status = subscription.map(|record| record.status);
        let enrollment_status = enrollment.map(|record| record.status);
        let status = status::unify(subscription_status.as_ref(), enrollment_status.as_ref());

        Ok(MembershipView {
            customer_id: customer_id.to_string(),
            grants_access: status.grants_access(),
            status,
            subscription_status,
            enrollment_status,
        })
    }

    async fn latest_enrollment(&self, customer_id: &str) -> StoreResult<Option<EnrollmentRecord>> {
        Ok(self
            .enrollments
            .find_enrollments(&EnrollmentLookup::ByCustomer(customer_id.to_string()), &[])
            .await?
            .into_iter()
            .max_by_key(|record| record.submitted_at))
    }

    /// The customer's own subscription, else one the provider linked to their latest
    /// enrollment. Reconciliation resolves the same two links.
    async fn resolve_subscription(
        &self,
        customer_id: &str,
        enrollment: Option<&EnrollmentRecord>,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        if let Some(record) = self
            .subscriptions
            .subscription_for_customer(customer_id)
            .await?
        {
            return Ok(Some(record));
        }
        match enrollment {
            Some(enrollment) => {
                self.subscriptions
                    .subscription_for_enrollment(enrollment.id)
                    .await
            }
            None => Ok(None),
        }
    }
}
