//! # Webhook Receivers
//!
//! Payment gateway and courier push notifications.
//!
//! ```text
//! Applied / Duplicate / Rejected  ──► 200 {"status":"ok"}
//! persistence failure             ──► 500 {"status":"error"}  (gateway retries)
//! ```
//!
//! Rejections are acknowledged so the gateway does not retry a payload that
//! will never apply; they are logged by the service.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

use pustakam_core::WebhookSource;
use pustakam_fulfillment::WebhookAck;

use crate::state::SharedState;

/// `POST /webhooks/payment`
pub async fn payment(State(state): State<SharedState>, body: Bytes) -> (StatusCode, Json<Value>) {
    acknowledge(&state, WebhookSource::Payment, &body).await
}

/// `POST /webhooks/courier`
pub async fn courier(State(state): State<SharedState>, body: Bytes) -> (StatusCode, Json<Value>) {
    acknowledge(&state, WebhookSource::Courier, &body).await
}

async fn acknowledge(
    state: &SharedState,
    source: WebhookSource,
    body: &[u8],
) -> (StatusCode, Json<Value>) {
    match state.service.handle_gateway_webhook(source, body).await {
        Ok(ack) => {
            if let WebhookAck::Applied { order_id, current, .. } = &ack {
                debug!(?source, order_id = %order_id, status = %current, "Webhook applied");
            }
            (StatusCode::OK, Json(json!({ "status": "ok" })))
        }
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error" })),
        ),
    }
}
