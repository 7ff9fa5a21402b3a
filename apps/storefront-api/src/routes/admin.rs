//! # Admin Routes
//!
//! Seller-side actions: hand-off to the courier and manual reconciliation.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use pustakam_core::OrderView;
use pustakam_fulfillment::ReconciliationReport;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub expected_delivery: Option<DateTime<Utc>>,
}

/// `POST /api/admin/orders/{order_id}/dispatch`
pub async fn dispatch_order(
    State(state): State<SharedState>,
    Path(order_id): Path<String>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(
        state
            .service
            .dispatch_order(&order_id, request.expected_delivery)
            .await?,
    ))
}

/// `POST /api/admin/reconcile`
///
/// Waits for the pass to finish. If a timed pass is running, this one runs
/// right after it.
pub async fn reconcile(
    State(state): State<SharedState>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    info!("Manual reconciliation requested");
    Ok(Json(state.reconciliation.run_now().await?))
}
