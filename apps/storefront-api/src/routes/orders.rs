//! # Order Routes
//!
//! Customer-facing checkout and order tracking.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use pustakam_core::{NewOrder, Order, OrderItem, OrderStatus, OrderSummary, OrderView};

use crate::error::ApiError;
use crate::state::SharedState;

/// Page size when `limit` is not given.
const DEFAULT_LIST_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AmendItemsRequest {
    pub items: Vec<OrderItem>,
}

/// `POST /api/orders`
pub async fn place_order(
    State(state): State<SharedState>,
    Json(input): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    debug!(items = input.items.len(), "place_order");
    let order = state.service.place_order(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /api/orders?status=confirmed&limit=50`
pub async fn list_orders(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    Ok(Json(state.service.list_orders(status, limit).await?))
}

/// `GET /api/orders/{order_id}`
pub async fn get_order(
    State(state): State<SharedState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.service.get_order_status(&order_id).await?))
}

/// `POST /api/orders/{order_id}/cancel`
pub async fn cancel_order(
    State(state): State<SharedState>,
    Path(order_id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Order>, ApiError> {
    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "customer request".to_string());

    Ok(Json(
        state.service.request_cancellation(&order_id, &reason).await?,
    ))
}

/// `POST /api/orders/{order_id}/items`
pub async fn amend_items(
    State(state): State<SharedState>,
    Path(order_id): Path<String>,
    Json(request): Json<AmendItemsRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(
        state.service.amend_items(&order_id, request.items).await?,
    ))
}
