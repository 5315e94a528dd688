use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

use super::{
    BillingService, BillingSummary, MembershipView, ReconcileReport, ReconcileTrigger,
    ReconciliationHandle,
};

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    /// Evaluate the ledger as of this date instead of today (UTC).
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

/// key: billing-api -> customer summary
pub async fn get_summary(
    Extension(service): Extension<BillingService>,
    Path(customer_id): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<BillingSummary>> {
    let customer_id = require_customer(customer_id)?;
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let summary = service.summary(&customer_id, today).await?;
    Ok(Json(summary))
}

pub async fn get_membership(
    Extension(service): Extension<BillingService>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<MembershipView>> {
    let customer_id = require_customer(customer_id)?;
    let view = service.membership(&customer_id).await?;
    Ok(Json(view))
}

/// Admin "sync now": runs reconciliation and returns its report.
pub async fn reconcile_now(
    Extension(handle): Extension<ReconciliationHandle>,
) -> AppResult<Json<ReconcileReport>> {
    let report = handle
        .run_now(ReconcileTrigger::Manual)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(report))
}

fn require_customer(customer_id: String) -> AppResult<String> {
    let trimmed = customer_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("customer id is required".into()));
    }
    Ok(trimmed.to_string())
}
