use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// key: billing-item-model -> every chargeable thing shown to a customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingItemType {
    Subscription,
    Maintenance,
    WorkOrder,
    Invoice,
}

impl BillingItemType {
    /// Feeds that track flat fees use loose labels; anything unrecognised is billed as an invoice.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "subscription" => Self::Subscription,
            "maintenance" => Self::Maintenance,
            "work_order" | "work-order" => Self::WorkOrder,
            _ => Self::Invoice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingItemStatus {
    Active,
    Pending,
    Overdue,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    OneTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: BillingItemType,
    pub description: String,
    /// USD minor units.
    pub amount_cents: i64,
    pub status: BillingItemStatus,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub interval: BillingInterval,
    pub next_bill_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// key: billing-totals -> money owed right now vs informational upcoming
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingTotals {
    pub past_due_cents: i64,
    /// Includes every past-due amount.
    pub due_now_cents: i64,
    pub upcoming_cents: i64,
    pub total_owed_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Active,
    Paused,
    Cancelled,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub active: bool,
    pub amount_cents: i64,
    pub interval: BillingInterval,
    pub next_bill_at: Option<DateTime<Utc>>,
    pub status: SnapshotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_reason: Option<String>,
}

impl SubscriptionSnapshot {
    pub fn none() -> Self {
        Self {
            active: false,
            amount_cents: 0,
            interval: BillingInterval::Monthly,
            next_bill_at: None,
            status: SnapshotStatus::None,
            paused_reason: None,
        }
    }
}

/// key: billing-summary -> categorized, time-aware view for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub past_due_items: Vec<BillingItem>,
    pub due_now_items: Vec<BillingItem>,
    pub upcoming_items: Vec<BillingItem>,
    pub totals: BillingTotals,
    pub subscription: SubscriptionSnapshot,
    pub has_overdue: bool,
    pub days_until_next_payment: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Provider-native subscription status. Unknown provider strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Expired,
    Paused,
    Incomplete,
    Other(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Paused => "paused",
            Self::Incomplete => "incomplete",
            Self::Other(raw) => raw.as_str(),
        }
    }

    /// Statuses that mean payment has lapsed and access must be withdrawn.
    pub fn is_lapsed(&self) -> bool {
        matches!(self, Self::Canceled | Self::Expired | Self::PastDue)
    }
}

impl From<&str> for SubscriptionStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "expired" => Self::Expired,
            "paused" => Self::Paused,
            "incomplete" => Self::Incomplete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Active,
    Cancelled,
    Other(String),
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl From<&str> for EnrollmentStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "active" => Self::Active,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EnrollmentStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<EnrollmentStatus> for String {
    fn from(status: EnrollmentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: membership-status -> canonical answer for access checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MembershipStatus {
    Active,
    Cancelled,
    PendingPayment,
    Pending,
    Approved,
    Unknown,
    Other(String),
}

impl MembershipStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::PendingPayment => "pending_payment",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Unknown => "unknown",
            Self::Other(raw) => raw.as_str(),
        }
    }

    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl From<&EnrollmentStatus> for MembershipStatus {
    fn from(status: &EnrollmentStatus) -> Self {
        match status {
            EnrollmentStatus::Pending => Self::Pending,
            EnrollmentStatus::Approved => Self::Approved,
            EnrollmentStatus::Active => Self::Active,
            EnrollmentStatus::Cancelled => Self::Cancelled,
            EnrollmentStatus::Other(raw) => Self::Other(raw.clone()),
        }
    }
}

impl From<String> for MembershipStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending_payment" => Self::PendingPayment,
            "unknown" => Self::Unknown,
            other => Self::from(&EnrollmentStatus::from(other)),
        }
    }
}

impl From<MembershipStatus> for String {
    fn from(status: MembershipStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: subscription-record -> payment processor's view, read-only here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub customer_id: Option<String>,
    pub enrollment_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    /// Raw provider flag; a subscription is only live when this is set and `status` is active.
    pub active: bool,
    pub amount_cents: i64,
    pub current_period_end: Option<DateTime<Utc>>,
    pub paused_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn is_live(&self) -> bool {
        self.active && self.status == SubscriptionStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: Uuid,
    pub customer_id: Option<String>,
    pub status: EnrollmentStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Other(String),
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for WorkOrderStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<WorkOrderStatus> for String {
    fn from(status: WorkOrderStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Uuid,
    pub customer_id: String,
    pub title: String,
    pub quoted_cost_cents: Option<i64>,
    pub status: WorkOrderStatus,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Flat fee tracked outside the work-order system (maintenance, ad-hoc invoices).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueItem {
    pub id: Uuid,
    pub customer_id: String,
    pub item_type: BillingItemType,
    pub description: String,
    pub amount_cents: i64,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePass {
    Load,
    Promote,
    Demote,
}

/// key: reconcile-failure -> enough context for an operator to retry by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileFailure {
    pub pass: ReconcilePass,
    pub subscription_id: Option<Uuid>,
    pub enrollment_id: Option<Uuid>,
    pub customer_id: Option<String>,
    pub cause: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub success: bool,
    pub updated_count: usize,
    pub errors: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    /// A successful run that wrote nothing means storage already agrees with the unifier.
    pub fn converged(&self) -> bool {
        self.success && self.updated_count == 0
    }
}

/// key: membership-view -> unified status plus the inputs it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipView {
    pub customer_id: String,
    pub status: MembershipStatus,
    pub grants_access: bool,
    pub subscription_status: Option<SubscriptionStatus>,
    pub enrollment_status: Option<EnrollmentStatus>,
}
