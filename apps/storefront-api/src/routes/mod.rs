//! # Routes
//!
//! ```text
//! POST /api/orders                              place_order
//! GET  /api/orders                              list_orders
//! GET  /api/orders/{order_id}                   get_order_status
//! POST /api/orders/{order_id}/cancel            request_cancellation
//! POST /api/orders/{order_id}/items             amend_items
//! POST /api/admin/orders/{order_id}/dispatch    dispatch_order
//! POST /api/admin/reconcile                     run_reconciliation
//! POST /webhooks/payment                        payment gateway push
//! POST /webhooks/courier                        courier push
//! GET  /health                                  liveness + database
//! ```

pub mod admin;
pub mod orders;
pub mod webhooks;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::SharedState;

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/orders", post(orders::place_order).get(orders::list_orders))
        .route("/api/orders/{order_id}", get(orders::get_order))
        .route("/api/orders/{order_id}/cancel", post(orders::cancel_order))
        .route("/api/orders/{order_id}/items", post(orders::amend_items))
        .route("/api/admin/orders/{order_id}/dispatch", post(admin::dispatch_order))
        .route("/api/admin/reconcile", post(admin::reconcile))
        .route("/webhooks/payment", post(webhooks::payment))
        .route("/webhooks/courier", post(webhooks::courier))
        .route("/health", get(health))
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    if state.service.database().health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok", "database": "up" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "down" })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pustakam_core::gateway::{CourierSnapshot, PaymentSnapshot};
    use pustakam_core::PricingPolicy;
    use pustakam_db::{Database, DbConfig, RefundRequest};
    use pustakam_fulfillment::{
        FulfillmentError, FulfillmentResult, FulfillmentService, GatewayClient,
        ReconciliationSettings, ReconciliationWorker, Reconciler,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Gateway that knows nothing and is down for refunds.
    struct SilentGateway;

    #[async_trait]
    impl GatewayClient for SilentGateway {
        async fn fetch_payment(
            &self,
            _order_id: &str,
            _gateway_reference: Option<&str>,
        ) -> FulfillmentResult<Option<PaymentSnapshot>> {
            Ok(None)
        }

        async fn track_shipment(
            &self,
            _order_id: &str,
            _tracking_number: Option<&str>,
        ) -> FulfillmentResult<Option<CourierSnapshot>> {
            Ok(None)
        }

        async fn request_refund(&self, _refund: &RefundRequest) -> FulfillmentResult<String> {
            Err(FulfillmentError::GatewayUnavailable("offline".into()))
        }
    }

    async fn app() -> Router {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = FulfillmentService::new(db, PricingPolicy::default());

        let settings = ReconciliationSettings {
            enabled: false,
            ..ReconciliationSettings::default()
        };
        let reconciler = Arc::new(Reconciler::new(
            service.clone(),
            Arc::new(SilentGateway),
            settings.clone(),
        ));
        let (worker, handle) = ReconciliationWorker::new(reconciler, &settings);
        tokio::spawn(worker.run());

        router(AppState::new(service, handle))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn order_body(method: &str) -> Value {
        json!({
            "items": [{
                "bookId": "bk-veyipadagalu",
                "title": "Veyi Padagalu",
                "author": "Viswanatha Satyanarayana",
                "quantity": 1,
                "unitPrice": 45000
            }],
            "shippingAddress": {
                "name": "Ravi",
                "phone": "+919440012345",
                "line1": "4-1-12, Governorpet",
                "city": "Vijayawada",
                "state": "Andhra Pradesh",
                "pincode": "520002"
            },
            "paymentMethod": method
        })
    }

    async fn place(app: &Router, method: &str) -> String {
        let (status, order) = send(app, "POST", "/api/orders", Some(order_body(method))).await;
        assert_eq!(status, StatusCode::CREATED, "{}", order);
        order["orderId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_place_and_fetch_order() {
        let app = app().await;
        let order_id = place(&app, "gateway_redirect").await;
        assert!(order_id.starts_with("ATK-"));

        let (status, view) = send(&app, "GET", &format!("/api/orders/{}", order_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["order"]["status"], "pending");
        // ₹450 + ₹50 shipping
        assert_eq!(view["order"]["totals"]["total"], 50_000);
        assert_eq!(view["payment"]["status"], "pending");
        assert!(view["shipment"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/api/orders/ATK-2024-999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_order_is_bad_request() {
        let app = app().await;
        let mut body = order_body("cash_on_delivery");
        body["items"] = json!([]);

        let (status, body) = send(&app, "POST", "/api/orders", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_payment_webhook_confirms_order() {
        let app = app().await;
        let order_id = place(&app, "gateway_redirect").await;

        let event = json!({
            "eventId": "evt_1",
            "eventType": "payment.captured",
            "orderReference": order_id,
            "amount": 50_000,
            "gatewayReference": "pay_abc"
        });
        let (status, body) = send(&app, "POST", "/webhooks/payment", Some(event.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        // Redelivery is acknowledged the same way.
        let (status, _) = send(&app, "POST", "/webhooks/payment", Some(event)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, view) = send(&app, "GET", &format!("/api/orders/{}", order_id), None).await;
        assert_eq!(view["order"]["status"], "confirmed");
        assert_eq!(view["payment"]["auditTrail"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_webhook_is_still_acknowledged() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/webhooks/courier",
            Some(json!({ "orderReference": "ATK-2024-404", "currentStatus": "teleported" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_shipped_order_cannot_be_cancelled() {
        let app = app().await;
        let order_id = place(&app, "cash_on_delivery").await;

        let (status, view) = send(
            &app,
            "POST",
            &format!("/api/admin/orders/{}/dispatch", order_id),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["shipment"]["status"], "pending");

        let scan = json!({
            "orderReference": order_id,
            "awb": "AWB900",
            "currentStatus": "PICKED UP",
            "timestamp": "2030-01-01T09:00:00Z"
        });
        let (status, _) = send(&app, "POST", "/webhooks/courier", Some(scan)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "changed my mind" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "ORDER_NOT_CANCELLABLE");
    }

    #[tokio::test]
    async fn test_authorized_order_cancel_is_conflict() {
        let app = app().await;
        let order_id = place(&app, "gateway_redirect").await;

        let event = json!({
            "eventId": "evt_auth",
            "eventType": "payment.authorized",
            "orderReference": order_id,
            "gatewayReference": "pay_auth"
        });
        let (status, _) = send(&app, "POST", "/webhooks/payment", Some(event)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "changed my mind" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "PAYMENT_IN_FLIGHT");

        let (_, view) = send(&app, "GET", &format!("/api/orders/{}", order_id), None).await;
        assert_eq!(view["payment"]["status"], "pending");
    }

    #[tokio::test]
    async fn test_cancel_and_amend_pending_order() {
        let app = app().await;
        let order_id = place(&app, "cash_on_delivery").await;

        let items = json!({ "items": [{
            "bookId": "bk-kanyasulkam",
            "title": "Kanyasulkam",
            "author": "Gurajada Apparao",
            "quantity": 2,
            "unitPrice": 30000
        }]});
        let (status, order) = send(&app, "POST", &format!("/api/orders/{}/items", order_id), Some(items)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["totals"]["total"], 60_000);

        let (status, order) = send(&app, "POST", &format!("/api/orders/{}/cancel", order_id), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_list_orders_filters_by_status() {
        let app = app().await;
        place(&app, "cash_on_delivery").await;
        place(&app, "gateway_redirect").await;

        let (status, list) = send(&app, "GET", "/api/orders?status=pending&limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 2);

        let (status, list) = send(&app, "GET", "/api/orders?status=delivered", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(list.as_array().unwrap().is_empty());

        let (status, body) = send(&app, "GET", "/api/orders?status=lost", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_manual_reconcile_reports_counts() {
        let app = app().await;
        let (status, report) = send(&app, "POST", "/api/admin/reconcile", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["reconciled"], 0);
        assert_eq!(report["refundsSubmitted"], 0);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "up");
    }
}
