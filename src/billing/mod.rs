pub mod api;
pub mod dates;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod reconciliation;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod store;
pub mod worker;

pub use api::{
    get_membership as billing_get_membership, get_summary as billing_get_summary,
    reconcile_now as billing_reconcile_now, SummaryQuery,
};
pub use ledger::aggregate;
pub use memory::InMemoryBillingStore;
pub use models::{
    BillingInterval, BillingItem, BillingItemStatus, BillingItemType, BillingSummary,
    BillingTotals, EnrollmentRecord, EnrollmentStatus, MembershipStatus, MembershipView,
    OverdueItem, ReconcileFailure, ReconcilePass, ReconcileReport, SnapshotStatus,
    SubscriptionRecord, SubscriptionSnapshot, SubscriptionStatus, WorkOrder, WorkOrderStatus,
};
pub use postgres::PgBillingStore;
pub use reconciliation::Reconciler;
pub use scheduler::spawn as spawn_reconcile_scheduler;
pub use service::BillingService;
pub use status::{unify, unify_raw};
pub use store::{
    ChargeFeed, EnrollmentLookup, EnrollmentStore, StoreError, StoreResult, SubscriptionFeed,
};
pub use worker::{
    start_reconciliation_worker, ReconcileTrigger, ReconciliationHandle, ReconciliationJob,
};
