//! # Fulfillment Service
//!
//! The operations the storefront, admin tooling and gateways call.
//!
//! ## Event Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  raw webhook body                                                      │
//! │       │  normalize_webhook        (bad payload → Rejected, logged)     │
//! │       ▼                                                                 │
//! │  GatewayEvent { external_id, order_reference, ... }                    │
//! │       │                                                                 │
//! │       ▼  locks.acquire(order_reference)                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ 1. external_id already processed?  → Duplicate                  │   │
//! │  │ 2. load aggregate                  → OrderNotFound              │   │
//! │  │ 3. (poll only) reflected / stale?  → skipped                    │   │
//! │  │ 4. aggregate.apply(event)          → lifecycle error, unchanged │   │
//! │  │ 5. save_with_event                 (aggregate + dedup, 1 tx)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  WebhookAck                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Webhook callers get an error only when persistence fails transiently,
//! so the gateway retries. Everything else is acknowledged.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use pustakam_core::gateway::normalize_webhook;
use pustakam_core::validation::{validate_items, validate_shipping_address};
use pustakam_core::{
    CoreError, GatewayEvent, NewOrder, Order, OrderAggregate, OrderItem, OrderStatus,
    OrderSummary, OrderView, PricingPolicy, SideEffect, StatusChange, WebhookSource,
};
use pustakam_db::{Database, NewRefundRequest, ProcessedEvent};

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::locks::OrderLocks;

/// Largest page `list_orders` returns.
pub const MAX_LIST_LIMIT: i64 = 200;

// =============================================================================
// Outcomes
// =============================================================================

/// How an event reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Webhook push. Lifecycle errors surface to the caller.
    Push,
    /// Replayed from a reconciliation poll. Facts we already hold, and
    /// scans older than the newest recorded one, are skipped.
    Poll,
}

/// Result of applying one normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(StatusChange),
    Duplicate,
    AlreadyReflected,
    Stale,
}

impl EventOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EventOutcome::Applied(_))
    }
}

/// What a webhook handler reports back to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookAck {
    Applied {
        order_id: String,
        external_id: String,
        previous: OrderStatus,
        current: OrderStatus,
    },
    Duplicate {
        external_id: String,
    },
    Rejected {
        code: &'static str,
        reason: String,
    },
}

// =============================================================================
// Service
// =============================================================================

/// Order lifecycle operations over the aggregate store.
///
/// Cheap to clone; clones share the store and the lock registry.
#[derive(Debug, Clone)]
pub struct FulfillmentService {
    db: Database,
    locks: Arc<OrderLocks>,
    pricing: PricingPolicy,
}

impl FulfillmentService {
    pub fn new(db: Database, pricing: PricingPolicy) -> Self {
        FulfillmentService {
            db,
            locks: Arc::new(OrderLocks::new()),
            pricing,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    // -------------------------------------------------------------------------
    // Customer Operations
    // -------------------------------------------------------------------------

    /// Creates an order and its pending payment.
    pub async fn place_order(&self, input: NewOrder) -> FulfillmentResult<Order> {
        // Validate before allocating so bad input does not burn an order number.
        validate_items(&input.items).map_err(CoreError::from)?;
        validate_shipping_address(&input.shipping_address).map_err(CoreError::from)?;

        let now = Utc::now();
        let orders = self.db.orders();
        let order_id = orders.allocate_order_id(now.year()).await?;
        let aggregate = OrderAggregate::place(order_id, input, &self.pricing, now)?;
        orders.insert(&aggregate).await?;

        info!(
            order_id = %aggregate.order_id(),
            total = %aggregate.order().totals.total,
            method = %aggregate.payment().method,
            "Order placed"
        );
        Ok(aggregate.order().clone())
    }

    /// Cancels an order, refunding or voiding its payment.
    ///
    /// A refund is queued in the same write and submitted to the gateway by
    /// the reconciliation job.
    pub async fn request_cancellation(&self, order_id: &str, reason: &str) -> FulfillmentResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut aggregate = self.load(order_id).await?;
        let now = Utc::now();

        let outcome = aggregate.request_cancellation(reason, now).inspect_err(|e| {
            warn!(order_id = %order_id, error = %e, "Cancellation refused");
        })?;

        let refunds: Vec<NewRefundRequest> = outcome
            .effects
            .iter()
            .filter_map(|effect| match effect {
                SideEffect::RefundRequested {
                    payment_id,
                    gateway_reference,
                    amount,
                } => Some(NewRefundRequest {
                    order_id: order_id.to_string(),
                    payment_id: payment_id.clone(),
                    gateway_reference: gateway_reference.clone(),
                    amount: *amount,
                    reason: reason.to_string(),
                }),
                _ => None,
            })
            .collect();

        self.db.orders().save_with_refunds(&aggregate, &refunds).await?;

        info!(
            order_id = %order_id,
            previous = %outcome.change.previous,
            refund = ?outcome.refund().map(|m| m.to_string()),
            "Order cancelled"
        );
        Ok(aggregate.order().clone())
    }

    /// Read-only projection of one order.
    pub async fn get_order_status(&self, order_id: &str) -> FulfillmentResult<OrderView> {
        Ok(self.load(order_id).await?.view())
    }

    /// Replaces the items of an order that is still pending.
    pub async fn amend_items(&self, order_id: &str, items: Vec<OrderItem>) -> FulfillmentResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut aggregate = self.load(order_id).await?;

        aggregate.amend_items(items, &self.pricing, Utc::now())?;
        self.db.orders().save(&aggregate).await?;

        info!(
            order_id = %order_id,
            total = %aggregate.order().totals.total,
            "Order items amended"
        );
        Ok(aggregate.order().clone())
    }

    // -------------------------------------------------------------------------
    // Admin Operations
    // -------------------------------------------------------------------------

    /// Creates the shipment when the parcel is handed to the courier.
    pub async fn dispatch_order(
        &self,
        order_id: &str,
        expected_delivery: Option<DateTime<Utc>>,
    ) -> FulfillmentResult<OrderView> {
        let _guard = self.locks.acquire(order_id).await;
        let mut aggregate = self.load(order_id).await?;

        let change = aggregate.dispatch(expected_delivery, Utc::now())?;
        self.db.orders().save(&aggregate).await?;

        info!(
            order_id = %order_id,
            previous = %change.previous,
            current = %change.current,
            "Order dispatched"
        );
        Ok(aggregate.view())
    }

    /// Admin order list, newest first.
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> FulfillmentResult<Vec<OrderSummary>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        Ok(self.db.orders().list(status, limit).await?)
    }

    // -------------------------------------------------------------------------
    // Gateway Events
    // -------------------------------------------------------------------------

    /// Entry point for payment and courier webhooks.
    ///
    /// Returns `Err` only for persistence failures, which the gateway should
    /// retry. Bad payloads, unknown orders and lifecycle rejections are logged
    /// and acknowledged as [`WebhookAck::Rejected`].
    pub async fn handle_gateway_webhook(
        &self,
        source: WebhookSource,
        body: &[u8],
    ) -> FulfillmentResult<WebhookAck> {
        let now = Utc::now();

        let event = match normalize_webhook(source, body, now) {
            Ok(event) => event,
            Err(e) => {
                warn!(?source, error = %e, "Rejected malformed gateway webhook");
                return Ok(WebhookAck::Rejected {
                    code: e.code(),
                    reason: e.to_string(),
                });
            }
        };

        match self.apply_event(&event, Delivery::Push, now).await {
            Ok(EventOutcome::Applied(change)) => Ok(WebhookAck::Applied {
                order_id: event.order_reference,
                external_id: event.external_id,
                previous: change.previous,
                current: change.current,
            }),
            Ok(_) => Ok(WebhookAck::Duplicate {
                external_id: event.external_id,
            }),
            Err(FulfillmentError::Lifecycle(e)) => {
                warn!(
                    order_id = %event.order_reference,
                    event_id = %event.external_id,
                    kind = event.kind.name(),
                    error = %e,
                    "Rejected gateway event"
                );
                Ok(WebhookAck::Rejected {
                    code: e.code(),
                    reason: e.to_string(),
                })
            }
            Err(FulfillmentError::OrderNotFound(order_id)) => {
                warn!(
                    order_id = %order_id,
                    event_id = %event.external_id,
                    "Gateway event for unknown order"
                );
                Ok(WebhookAck::Rejected {
                    code: "ORDER_NOT_FOUND",
                    reason: format!("Order not found: {}", order_id),
                })
            }
            Err(e) => {
                error!(
                    order_id = %event.order_reference,
                    event_id = %event.external_id,
                    error = %e,
                    "Failed to persist gateway event"
                );
                Err(e)
            }
        }
    }

    /// Applies one normalized event under the order's lock.
    ///
    /// Shared by webhook push and reconciliation replay, so both paths
    /// deduplicate on the same `external_id`.
    pub async fn apply_event(
        &self,
        event: &GatewayEvent,
        delivery: Delivery,
        now: DateTime<Utc>,
    ) -> FulfillmentResult<EventOutcome> {
        let _guard = self.locks.acquire(&event.order_reference).await;

        if self.db.gateway_events().is_processed(&event.external_id).await? {
            debug!(event_id = %event.external_id, "Duplicate gateway event");
            return Ok(EventOutcome::Duplicate);
        }

        let mut aggregate = self.load(&event.order_reference).await?;

        if delivery == Delivery::Poll {
            if aggregate.is_reflected(event) {
                debug!(event_id = %event.external_id, "Polled event already reflected");
                return Ok(EventOutcome::AlreadyReflected);
            }
            if aggregate.is_stale(event) {
                debug!(event_id = %event.external_id, "Polled scan older than last recorded");
                return Ok(EventOutcome::Stale);
            }
        }

        let change = aggregate.apply(event, now)?;
        self.db
            .orders()
            .save_with_event(&aggregate, &ProcessedEvent::from_event(event, now))
            .await?;

        if change.changed() {
            info!(
                order_id = %event.order_reference,
                event_id = %event.external_id,
                previous = %change.previous,
                current = %change.current,
                "Order status changed"
            );
        } else {
            debug!(
                order_id = %event.order_reference,
                event_id = %event.external_id,
                kind = event.kind.name(),
                "Gateway event applied"
            );
        }
        Ok(EventOutcome::Applied(change))
    }

    async fn load(&self, order_id: &str) -> FulfillmentResult<OrderAggregate> {
        self.db
            .orders()
            .load(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pustakam_core::{
        Money, PaymentMethod, PaymentStatus, ShipmentStatus, ShippingAddress, ValidationError,
    };
    use pustakam_db::DbConfig;
    use serde_json::json;

    pub(crate) async fn service() -> FulfillmentService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        FulfillmentService::new(db, PricingPolicy::default())
    }

    pub(crate) fn book(id: &str, quantity: i64, rupees: i64) -> OrderItem {
        OrderItem {
            book_id: id.to_string(),
            title: format!("Title {}", id),
            author: "Sri Sri".to_string(),
            quantity,
            unit_price: Money::from_rupees(rupees),
        }
    }

    pub(crate) fn new_order(method: PaymentMethod, rupees: i64) -> NewOrder {
        NewOrder {
            items: vec![book("bk-mahaprasthanam", 1, rupees)],
            shipping_address: ShippingAddress {
                name: "Lakshmi".to_string(),
                phone: "+919848012345".to_string(),
                line1: "12-3-45, Ameerpet".to_string(),
                line2: None,
                city: "Hyderabad".to_string(),
                state: "Telangana".to_string(),
                pincode: "500016".to_string(),
            },
            payment_method: method,
        }
    }

    pub(crate) fn payment_body(order_id: &str, event_type: &str, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "eventId": format!("evt_{}_{}", order_id, event_type),
            "eventType": event_type,
            "orderReference": order_id,
            "amount": amount,
            "gatewayReference": format!("pay_{}", order_id),
            "createdAt": "2024-03-01T10:00:00Z"
        }))
        .unwrap()
    }

    fn courier_body(order_id: &str, status: &str, timestamp: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "orderReference": order_id,
            "awb": "AWB123",
            "currentStatus": status,
            "location": "Hyderabad Hub",
            "timestamp": timestamp
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_place_cod_order_stays_pending() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::CashOnDelivery, 300))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        // Below the free-shipping threshold.
        assert_eq!(order.totals.total, Money::from_rupees(350));

        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.payment.status, PaymentStatus::Pending);
        assert!(view.shipment.is_none());
    }

    #[tokio::test]
    async fn test_invalid_order_does_not_allocate_number() {
        let service = service().await;
        let mut input = new_order(PaymentMethod::GatewayRedirect, 300);
        input.items.clear();

        let err = service.place_order(input).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Lifecycle(CoreError::Validation(_))));

        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 300))
            .await
            .unwrap();
        assert!(order.order_id.ends_with("-001"));
    }

    #[tokio::test]
    async fn test_capture_webhook_confirms_and_replay_is_duplicate() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 600))
            .await
            .unwrap();
        let body = payment_body(&order.order_id, "payment.captured", 60_000);

        let ack = service
            .handle_gateway_webhook(WebhookSource::Payment, &body)
            .await
            .unwrap();
        assert!(matches!(
            ack,
            WebhookAck::Applied {
                previous: OrderStatus::Pending,
                current: OrderStatus::Confirmed,
                ..
            }
        ));

        let before = service.get_order_status(&order.order_id).await.unwrap();
        let ack = service
            .handle_gateway_webhook(WebhookSource::Payment, &body)
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Duplicate { .. }));
        assert_eq!(service.get_order_status(&order.order_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_apply_once() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 600))
            .await
            .unwrap();
        let body = payment_body(&order.order_id, "payment.captured", 60_000);

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let service = service.clone();
                let body = body.clone();
                tokio::spawn(async move {
                    service
                        .handle_gateway_webhook(WebhookSource::Payment, &body)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), WebhookAck::Applied { .. }) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.payment.audit_trail.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_webhooks_are_acknowledged_as_rejected() {
        let service = service().await;

        let ack = service
            .handle_gateway_webhook(WebhookSource::Payment, b"{not json")
            .await
            .unwrap();
        assert!(matches!(
            ack,
            WebhookAck::Rejected {
                code: "MALFORMED_GATEWAY_PAYLOAD",
                ..
            }
        ));

        let body = payment_body("ATK-2024-404", "payment.captured", 100);
        let ack = service
            .handle_gateway_webhook(WebhookSource::Payment, &body)
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Rejected { code: "ORDER_NOT_FOUND", .. }));

        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 300))
            .await
            .unwrap();
        let body = payment_body(&order.order_id, "payment.disputed", 35_000);
        let ack = service
            .handle_gateway_webhook(WebhookSource::Payment, &body)
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Rejected { code: "UNRECOGNIZED_STATUS", .. }));
    }

    #[tokio::test]
    async fn test_cancel_captured_order_queues_full_refund() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 600))
            .await
            .unwrap();
        service
            .handle_gateway_webhook(
                WebhookSource::Payment,
                &payment_body(&order.order_id, "payment.captured", 60_000),
            )
            .await
            .unwrap();

        let cancelled = service
            .request_cancellation(&order.order_id, "ordered twice")
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("ordered twice"));

        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.payment.status, PaymentStatus::Refunded);
        assert_eq!(view.payment.refund_amount, Some(Money::from_rupees(600)));

        let refunds = service
            .database()
            .refund_requests()
            .for_order(&order.order_id)
            .await
            .unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, Money::from_rupees(600));
        assert_eq!(refunds[0].gateway_reference, view.payment.gateway_reference);

        let err = service
            .request_cancellation(&order.order_id, "again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Lifecycle(CoreError::OrderNotCancellable { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_order_voids_without_refund() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::CashOnDelivery, 300))
            .await
            .unwrap();

        service
            .request_cancellation(&order.order_id, "changed my mind")
            .await
            .unwrap();

        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.order.status, OrderStatus::Cancelled);
        assert_eq!(view.payment.status, PaymentStatus::Failed);
        assert_eq!(service.database().refund_requests().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_courier_webhooks_drive_shipment() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::CashOnDelivery, 300))
            .await
            .unwrap();

        let view = service.dispatch_order(&order.order_id, None).await.unwrap();
        assert_eq!(view.order.status, OrderStatus::Processing);

        let ack = service
            .handle_gateway_webhook(
                WebhookSource::Courier,
                &courier_body(&order.order_id, "Picked Up", "2024-03-02T09:00:00Z"),
            )
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Applied { current: OrderStatus::Shipped, .. }));

        let ack = service
            .handle_gateway_webhook(
                WebhookSource::Courier,
                &courier_body(&order.order_id, "DELIVERED", "2024-03-04T15:30:00Z"),
            )
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Applied { current: OrderStatus::Delivered, .. }));

        let ack = service
            .handle_gateway_webhook(
                WebhookSource::Courier,
                &courier_body(&order.order_id, "in_transit", "2024-03-03T08:00:00Z"),
            )
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Rejected { .. }));

        let view = service.get_order_status(&order.order_id).await.unwrap();
        let shipment = view.shipment.unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Delivered);
        assert_eq!(shipment.tracking_number.as_deref(), Some("AWB123"));
        assert_eq!(view.tracking_events.len(), 2);

        let err = service
            .request_cancellation(&order.order_id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Lifecycle(CoreError::OrderNotCancellable { .. })
        ));
    }

    #[tokio::test]
    async fn test_courier_cancel_does_not_strand_captured_payment() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 600))
            .await
            .unwrap();
        service
            .handle_gateway_webhook(
                WebhookSource::Payment,
                &payment_body(&order.order_id, "payment.captured", 60_000),
            )
            .await
            .unwrap();
        service.dispatch_order(&order.order_id, None).await.unwrap();

        let ack = service
            .handle_gateway_webhook(
                WebhookSource::Courier,
                &courier_body(&order.order_id, "CANCELLED", "2024-03-02T09:00:00Z"),
            )
            .await
            .unwrap();
        assert!(matches!(
            ack,
            WebhookAck::Rejected {
                code: "INVALID_SHIPMENT_TRANSITION",
                ..
            }
        ));

        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.order.status, OrderStatus::Processing);
        assert_eq!(view.payment.status, PaymentStatus::Success);
        assert_eq!(view.shipment.unwrap().status, ShipmentStatus::Pending);

        service
            .request_cancellation(&order.order_id, "courier declined pickup")
            .await
            .unwrap();
        let refunds = service
            .database()
            .refund_requests()
            .for_order(&order.order_id)
            .await
            .unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, Money::from_rupees(600));
    }

    #[tokio::test]
    async fn test_authorized_payment_blocks_cancellation_until_captured() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 600))
            .await
            .unwrap();
        service
            .handle_gateway_webhook(
                WebhookSource::Payment,
                &payment_body(&order.order_id, "payment.authorized", 60_000),
            )
            .await
            .unwrap();

        let err = service
            .request_cancellation(&order.order_id, "changed my mind")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Lifecycle(CoreError::PaymentInFlight { .. })
        ));

        // The late capture still lands, and cancelling then refunds it.
        let ack = service
            .handle_gateway_webhook(
                WebhookSource::Payment,
                &payment_body(&order.order_id, "payment.captured", 60_000),
            )
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Applied { current: OrderStatus::Confirmed, .. }));

        service
            .request_cancellation(&order.order_id, "changed my mind")
            .await
            .unwrap();
        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.payment.status, PaymentStatus::Refunded);
        assert_eq!(service.database().refund_requests().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversized_price_is_rejected_without_allocating() {
        let service = service().await;
        let mut input = new_order(PaymentMethod::GatewayRedirect, 300);
        input.items = vec![OrderItem {
            unit_price: Money::from_paise(i64::MAX / 2 + 1),
            quantity: 2,
            ..book("bk-1", 1, 300)
        }];

        let err = service.place_order(input).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Lifecycle(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 300))
            .await
            .unwrap();
        assert!(order.order_id.ends_with("-001"));
    }

    #[tokio::test]
    async fn test_dispatch_requires_payment() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 300))
            .await
            .unwrap();

        let err = service.dispatch_order(&order.order_id, None).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Lifecycle(CoreError::NotDispatchable { .. })
        ));

        let err = service.dispatch_order("ATK-2024-999", None).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_amend_items_only_while_pending() {
        let service = service().await;
        let order = service
            .place_order(new_order(PaymentMethod::GatewayRedirect, 300))
            .await
            .unwrap();

        let amended = service
            .amend_items(&order.order_id, vec![book("bk-1", 2, 300)])
            .await
            .unwrap();
        assert_eq!(amended.totals.total, Money::from_rupees(600));
        let view = service.get_order_status(&order.order_id).await.unwrap();
        assert_eq!(view.payment.amount, Money::from_rupees(600));

        service
            .handle_gateway_webhook(
                WebhookSource::Payment,
                &payment_body(&order.order_id, "payment.captured", 60_000),
            )
            .await
            .unwrap();

        let err = service
            .amend_items(&order.order_id, vec![book("bk-1", 1, 300)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Lifecycle(CoreError::ItemsLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_clamps() {
        let service = service().await;
        let first = service
            .place_order(new_order(PaymentMethod::CashOnDelivery, 300))
            .await
            .unwrap();
        service
            .place_order(new_order(PaymentMethod::CashOnDelivery, 300))
            .await
            .unwrap();
        service.request_cancellation(&first.order_id, "duplicate").await.unwrap();

        assert_eq!(service.list_orders(None, 0).await.unwrap().len(), 1);
        assert_eq!(service.list_orders(None, 10_000).await.unwrap().len(), 2);

        let cancelled = service
            .list_orders(Some(OrderStatus::Cancelled), 10)
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].order_id, first.order_id);
    }
}
