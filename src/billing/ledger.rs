use chrono::NaiveDate;
use tracing::{debug, warn};

use super::dates::{days_until, first_day_of_next_month, format_cents};
use super::models::{
    BillingInterval, BillingItem, BillingItemStatus, BillingItemType, BillingSummary,
    BillingTotals, OverdueItem, SnapshotStatus, SubscriptionRecord, SubscriptionSnapshot,
    SubscriptionStatus, WorkOrder, WorkOrderStatus,
};

/// key: ledger-aggregator -> categorize raw charges relative to `today`
///
/// Pure: the caller supplies `today`, nothing here reads the clock. Items land in
/// exactly one of the three lists. Past-due money is folded into `due_now_cents`
/// without being re-listed in `due_now_items`, and the upcoming subscription charge
/// is informational only, so it never contributes to `total_owed_cents`.
pub fn aggregate(
    work_orders: &[WorkOrder],
    subscription: Option<&SubscriptionRecord>,
    overdue_items: &[OverdueItem],
    today: NaiveDate,
) -> BillingSummary {
    let mut past_due_items = Vec::new();
    let mut due_now_items = Vec::new();
    let mut upcoming_items = Vec::new();
    let mut warnings = Vec::new();

    for item in overdue_items {
        let Some(due_date) = item.due_date else {
            warn!(item = %item.id, customer = %item.customer_id, "overdue item has no due date; leaving it out of the summary");
            warnings.push(format!("billing:overdue-item-undated:{}", item.id));
            continue;
        };
        if item.amount_cents < 0 {
            warn!(item = %item.id, amount_cents = item.amount_cents, "overdue item carries a negative amount; leaving it out of the summary");
            warnings.push(format!("billing:overdue-item-negative:{}", item.id));
            continue;
        }

        if due_date < today {
            past_due_items.push(overdue_billing_item(item, BillingItemStatus::Overdue));
        } else if due_date == today {
            due_now_items.push(overdue_billing_item(item, BillingItemStatus::Pending));
        } else {
            debug!(item = %item.id, %due_date, "overdue item not yet actionable");
        }
    }

    for order in work_orders {
        if let Some(item) = work_order_billing_item(order) {
            due_now_items.push(item);
        }
    }

    let snapshot = subscription
        .map(|record| snapshot_for(record, today))
        .unwrap_or_else(SubscriptionSnapshot::none);

    if let (true, Some(record), Some(next_bill_at)) =
        (snapshot.active, subscription, snapshot.next_bill_at)
    {
        upcoming_items.push(BillingItem {
            id: format!("subscription:{}", record.id),
            item_type: BillingItemType::Subscription,
            description: format!(
                "Monthly membership ({})",
                format_cents(snapshot.amount_cents)
            ),
            amount_cents: snapshot.amount_cents,
            status: BillingItemStatus::Active,
            due_date: Some(next_bill_at.date_naive()),
            paid_at: None,
            interval: BillingInterval::Monthly,
            next_bill_at: Some(next_bill_at),
            created_at: record.created_at,
        });
    }

    let past_due_cents = sum_cents(&past_due_items);
    let due_now_cents = past_due_cents + sum_cents(&due_now_items);
    let totals = BillingTotals {
        past_due_cents,
        due_now_cents,
        upcoming_cents: sum_cents(&upcoming_items),
        total_owed_cents: due_now_cents,
    };

    let has_overdue = totals.past_due_cents > 0;
    let days_until_next_payment = if has_overdue {
        None
    } else {
        snapshot.next_bill_at.map(|next| days_until(next, today))
    };

    BillingSummary {
        past_due_items,
        due_now_items,
        upcoming_items,
        totals,
        subscription: snapshot,
        has_overdue,
        days_until_next_payment,
        warnings,
    }
}

fn snapshot_for(record: &SubscriptionRecord, today: NaiveDate) -> SubscriptionSnapshot {
    let active = record.is_live();
    let status = if active {
        SnapshotStatus::Active
    } else if record.status == SubscriptionStatus::Paused {
        SnapshotStatus::Paused
    } else {
        SnapshotStatus::Cancelled
    };
    let paused_reason = match status {
        SnapshotStatus::Paused => record.paused_reason.clone(),
        _ => None,
    };

    SubscriptionSnapshot {
        active,
        amount_cents: record.amount_cents,
        interval: BillingInterval::Monthly,
        next_bill_at: Some(
            record
                .current_period_end
                .unwrap_or_else(|| first_day_of_next_month(today)),
        ),
        status,
        paused_reason,
    }
}

fn overdue_billing_item(item: &OverdueItem, status: BillingItemStatus) -> BillingItem {
    BillingItem {
        id: item.id.to_string(),
        item_type: item.item_type,
        description: item.description.clone(),
        amount_cents: item.amount_cents,
        status,
        due_date: item.due_date,
        paid_at: None,
        interval: BillingInterval::OneTime,
        next_bill_at: None,
        created_at: item.created_at,
    }
}

/// Completed, unpaid work is always due now; it is never scheduled ahead.
fn work_order_billing_item(order: &WorkOrder) -> Option<BillingItem> {
    let amount_cents = order.quoted_cost_cents.unwrap_or(0);
    let billable = order.status == WorkOrderStatus::Completed
        && !order.paid
        && order.paid_at.is_none()
        && amount_cents > 0;
    if !billable {
        return None;
    }

    Some(BillingItem {
        id: order.id.to_string(),
        item_type: BillingItemType::WorkOrder,
        description: order.title.clone(),
        amount_cents,
        status: BillingItemStatus::Pending,
        due_date: order.completed_at.map(|at| at.date_naive()),
        paid_at: None,
        interval: BillingInterval::OneTime,
        next_bill_at: None,
        created_at: order.created_at,
    })
}

fn sum_cents(items: &[BillingItem]) -> i64 {
    items.iter().map(|item| item.amount_cents).sum()
}
