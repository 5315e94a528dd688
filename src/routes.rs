use axum::{
    routing::{get, post},
    Router,
};

use crate::billing;

pub fn api_routes() -> Router {
    Router::new()
        .route(
            "/api/billing/customers/:customer_id/summary",
            get(billing::billing_get_summary),
        )
        .route(
            "/api/billing/customers/:customer_id/membership",
            get(billing::billing_get_membership),
        )
        .route("/api/billing/reconcile", post(billing::billing_reconcile_now))
}
