//! # Order Lifecycle Orchestrator
//!
//! Owns the order aggregate (Order + Payment + optional Shipment) and is the
//! only code that changes it.
//!
//! ## Status Derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Order.status is RECOMPUTED after every change, never patched:          │
//! │                                                                         │
//! │     Payment.status ──┐                                                  │
//! │                      ├──► derive_order_status() ──► Order.status        │
//! │     Shipment.status ─┘         (pure, total)                            │
//! │                                                                         │
//! │  Replaying an event converges: same inputs, same output.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation Ordering
//! ```text
//! request_cancellation(reason)
//!     │
//!     ├── 1. captured money?  ──► ledger refund (remaining balance)
//!     │                           + SideEffect::RefundRequested
//!     │   authorized payment? ──► PaymentInFlight (nothing changes)
//!     │   pending payment?    ──► void (pending → failed)
//!     │
//!     ├── 2. shipment?        ──► tracker cancel
//!     │                           + SideEffect::ShipmentCancelled
//!     │
//!     └── 3. recompute status ──► cancelled
//! ```
//! All steps run on a working copy that replaces the aggregate only when
//! every step succeeded. This is the only path to a cancelled shipment; a
//! courier reporting `cancelled` is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::gateway::{GatewayEvent, GatewayEventKind};
use crate::ledger::Capture;
use crate::money::Money;
use crate::tracker::Scan;
use crate::types::{
    Order, OrderItem, OrderStatus, OrderTotals, Payment, PaymentMethod, PaymentStatus,
    PricingPolicy, Shipment, ShipmentStatus, ShippingAddress, TrackingEvent,
};
use crate::validation::{validate_items, validate_order_id, validate_reason, validate_shipping_address};

// =============================================================================
// Status Derivation
// =============================================================================

/// Derives an order's status from its payment and shipment.
///
/// | Payment | Shipment | Order |
/// |---|---|---|
/// | refunded | any | cancelled |
/// | failed | any | cancelled |
/// | pending | absent | pending |
/// | success, partial_refund | absent | confirmed |
/// | any live | pending | processing |
/// | any live | picked_up, in_transit, out_for_delivery | shipped |
/// | any live | delivered | delivered |
/// | any live | returned, cancelled | cancelled |
///
/// "Live" means pending, success or partial_refund. A pending payment with a
/// shipment is a cash-on-delivery order.
pub fn derive_order_status(payment: PaymentStatus, shipment: Option<ShipmentStatus>) -> OrderStatus {
    use OrderStatus as O;
    use PaymentStatus as P;
    use ShipmentStatus as S;

    match (payment, shipment) {
        (P::Refunded, _) => O::Cancelled,
        (P::Failed, _) => O::Cancelled,
        (P::Pending, None) => O::Pending,
        (P::Success | P::PartialRefund, None) => O::Confirmed,
        (P::Pending | P::Success | P::PartialRefund, Some(S::Pending)) => O::Processing,
        (
            P::Pending | P::Success | P::PartialRefund,
            Some(S::PickedUp | S::InTransit | S::OutForDelivery),
        ) => O::Shipped,
        (P::Pending | P::Success | P::PartialRefund, Some(S::Delivered)) => O::Delivered,
        (P::Pending | P::Success | P::PartialRefund, Some(S::Returned | S::Cancelled)) => {
            O::Cancelled
        }
    }
}

// =============================================================================
// Inputs and Outcomes
// =============================================================================

/// What the storefront submits at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Order status before and after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub previous: OrderStatus,
    pub current: OrderStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Work the caller must carry out after a cancellation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    /// Ask the gateway to return `amount` to the customer.
    RefundRequested {
        payment_id: String,
        gateway_reference: Option<String>,
        amount: Money,
    },
    /// Pending payment closed without money moving.
    PaymentVoided { payment_id: String },
    /// Tell the courier not to pick up.
    ShipmentCancelled {
        shipment_id: String,
        tracking_number: Option<String>,
    },
}

/// Result of a successful cancellation. `effects` are in the order applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub change: StatusChange,
    pub effects: Vec<SideEffect>,
}

impl CancellationOutcome {
    /// The refund requested by this cancellation, if any.
    pub fn refund(&self) -> Option<Money> {
        self.effects.iter().find_map(|e| match e {
            SideEffect::RefundRequested { amount, .. } => Some(*amount),
            _ => None,
        })
    }
}

/// Read-only projection handed to the storefront and admin console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order: Order,
    pub payment: Payment,
    pub shipment: Option<Shipment>,
    pub tracking_events: Vec<TrackingEvent>,
}

// =============================================================================
// Order Aggregate
// =============================================================================

/// An order with its payment and shipment.
///
/// Fields are private: every change goes through a method that ends by
/// recomputing `Order.status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAggregate {
    order: Order,
    payment: Payment,
    shipment: Option<Shipment>,
}

impl OrderAggregate {
    /// Creates an order and its pending payment.
    pub fn place(
        order_id: String,
        input: NewOrder,
        pricing: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        validate_order_id(&order_id)?;
        validate_items(&input.items)?;
        validate_shipping_address(&input.shipping_address)?;

        let totals = OrderTotals::compute(&input.items, pricing);
        let payment = Payment::new(order_id.clone(), input.payment_method, totals.total, now);
        let order = Order {
            order_id,
            status: derive_order_status(payment.status, None),
            items: input.items,
            totals,
            shipping_address: input.shipping_address,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        Ok(OrderAggregate {
            order,
            payment,
            shipment: None,
        })
    }

    /// Rebuilds an aggregate loaded from storage.
    ///
    /// The stored status is ignored and derived again.
    pub fn restore(mut order: Order, payment: Payment, shipment: Option<Shipment>) -> Self {
        order.status = derive_order_status(payment.status, shipment.as_ref().map(|s| s.status));
        OrderAggregate {
            order,
            payment,
            shipment,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order.order_id
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn payment(&self) -> &Payment {
        &self.payment
    }

    pub fn shipment(&self) -> Option<&Shipment> {
        self.shipment.as_ref()
    }

    /// Read-only projection.
    pub fn view(&self) -> OrderView {
        OrderView {
            order: self.order.clone(),
            payment: self.payment.clone(),
            shipment: self.shipment.clone(),
            tracking_events: self
                .shipment
                .as_ref()
                .map(|s| s.tracking_events.clone())
                .unwrap_or_default(),
        }
    }

    // -------------------------------------------------------------------------
    // Gateway Events
    // -------------------------------------------------------------------------

    /// Applies a normalized gateway event.
    ///
    /// The ledger and tracker validate before mutating, so on error the
    /// aggregate is unchanged.
    pub fn apply(&mut self, event: &GatewayEvent, now: DateTime<Utc>) -> CoreResult<StatusChange> {
        if event.order_reference != self.order.order_id {
            return Err(CoreError::malformed(format!(
                "event for {} routed to {}",
                event.order_reference, self.order.order_id
            )));
        }

        let previous = self.order.status;
        let at = event.occurred_at;

        match &event.kind {
            GatewayEventKind::PaymentAuthorized { gateway_reference } => {
                self.payment.authorize(gateway_reference.as_deref(), at)?;
            }
            GatewayEventKind::PaymentCaptured {
                amount,
                fee,
                tax,
                gateway_reference,
            } => {
                let capture = Capture {
                    amount: *amount,
                    fee: *fee,
                    tax: *tax,
                    gateway_reference: gateway_reference.clone(),
                };
                self.payment.capture(&capture, at)?;
            }
            GatewayEventKind::PaymentFailed {
                reason,
                gateway_reference,
            } => {
                self.payment.fail(reason, gateway_reference.as_deref(), at)?;
            }
            GatewayEventKind::PaymentRefunded { amount, refund_id } => {
                let cause = match refund_id {
                    Some(id) => format!("refund {}", id),
                    None => "refund".to_string(),
                };
                self.payment.refund(*amount, &cause, at)?;
            }
            kind => {
                let scan = scan_for(kind, at)?;
                let order_id = &self.order.order_id;
                let shipment = self.shipment.as_mut().ok_or_else(|| CoreError::MissingShipment {
                    order_id: order_id.clone(),
                })?;
                // Only request_cancellation may cancel a shipment; it settles
                // the payment first.
                if scan.status == ShipmentStatus::Cancelled {
                    return Err(CoreError::InvalidShipmentTransition {
                        from: shipment.status,
                        to: ShipmentStatus::Cancelled,
                    });
                }
                shipment.record(scan)?;
            }
        }

        self.recompute(now);
        Ok(StatusChange {
            previous,
            current: self.order.status,
        })
    }

    /// Whether local state already reflects `event`.
    ///
    /// Used when replaying polled snapshots, where the gateway reports facts
    /// we may have learned through a different event id.
    pub fn is_reflected(&self, event: &GatewayEvent) -> bool {
        let payment = self.payment.status;
        match &event.kind {
            GatewayEventKind::PaymentAuthorized { gateway_reference } => {
                payment != PaymentStatus::Pending
                    || (gateway_reference.is_some()
                        && self.payment.gateway_reference == *gateway_reference)
            }
            GatewayEventKind::PaymentCaptured { .. } => {
                payment.is_captured() || payment == PaymentStatus::Refunded
            }
            GatewayEventKind::PaymentFailed { .. } => payment == PaymentStatus::Failed,
            GatewayEventKind::PaymentRefunded { .. } => payment == PaymentStatus::Refunded,
            kind => {
                let (Some(shipment), Some(status)) = (&self.shipment, kind.shipment_status()) else {
                    return false;
                };
                let recorded = shipment
                    .tracking_events
                    .iter()
                    .any(|e| e.status == status && e.timestamp == event.occurred_at);
                recorded
                    || (status == ShipmentStatus::PickedUp && shipment.status != ShipmentStatus::Pending)
                    || (status.is_terminal() && shipment.status == status)
            }
        }
    }

    /// Whether a shipment event predates the newest recorded scan.
    pub fn is_stale(&self, event: &GatewayEvent) -> bool {
        if !event.kind.is_shipment_event() {
            return false;
        }
        self.shipment
            .as_ref()
            .and_then(Shipment::last_event_at)
            .is_some_and(|last| event.occurred_at < last)
    }

    // -------------------------------------------------------------------------
    // Seller and Customer Actions
    // -------------------------------------------------------------------------

    /// Creates the shipment once the seller hands the parcel to the courier.
    ///
    /// ## Allowed When
    /// - No shipment yet and the order is not cancelled
    /// - Payment captured, or cash on delivery still pending
    pub fn dispatch(
        &mut self,
        expected_delivery: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CoreResult<StatusChange> {
        let not_dispatchable = |reason: String| CoreError::NotDispatchable {
            order_id: self.order.order_id.clone(),
            reason,
        };

        if self.shipment.is_some() {
            return Err(not_dispatchable("already dispatched".to_string()));
        }
        if self.order.status == OrderStatus::Cancelled {
            return Err(not_dispatchable("order is cancelled".to_string()));
        }
        let cod_pending = self.payment.method == PaymentMethod::CashOnDelivery
            && self.payment.status == PaymentStatus::Pending;
        if !self.payment.status.is_captured() && !cod_pending {
            return Err(not_dispatchable(format!("payment is {}", self.payment.status)));
        }

        let previous = self.order.status;
        self.shipment = Some(Shipment::new(self.order.order_id.clone(), expected_delivery, now));
        self.recompute(now);
        Ok(StatusChange {
            previous,
            current: self.order.status,
        })
    }

    /// Replaces the order's items while it is still pending.
    pub fn amend_items(
        &mut self,
        items: Vec<OrderItem>,
        pricing: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.order.status != OrderStatus::Pending {
            return Err(CoreError::ItemsLocked {
                order_id: self.order.order_id.clone(),
                status: self.order.status,
            });
        }
        validate_items(&items)?;

        let totals = OrderTotals::compute(&items, pricing);
        self.payment.reprice(totals.total, now)?;
        self.order.items = items;
        self.order.totals = totals;
        self.recompute(now);
        Ok(())
    }

    /// Cancels the order on a customer or admin request.
    ///
    /// Refund (or void) is applied before the shipment is cancelled.
    ///
    /// ## Errors
    /// - `OrderNotCancellable` once the order is shipped, delivered or cancelled
    /// - `PaymentInFlight` while an authorized payment awaits capture
    pub fn request_cancellation(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<CancellationOutcome> {
        validate_reason(reason)?;
        let previous = self.order.status;
        if !previous.is_cancellable() {
            return Err(CoreError::OrderNotCancellable {
                order_id: self.order.order_id.clone(),
                status: previous,
            });
        }
        if let (PaymentStatus::Pending, Some(reference)) =
            (self.payment.status, &self.payment.gateway_reference)
        {
            return Err(CoreError::PaymentInFlight {
                order_id: self.order.order_id.clone(),
                gateway_reference: reference.clone(),
            });
        }

        let mut next = self.clone();
        let mut effects = Vec::new();
        let cause = format!("order cancelled: {}", reason);

        if next.payment.status.is_captured() {
            let amount = next.payment.refundable_balance();
            next.payment.refund(amount, &cause, now)?;
            effects.push(SideEffect::RefundRequested {
                payment_id: next.payment.payment_id.clone(),
                gateway_reference: next.payment.gateway_reference.clone(),
                amount,
            });
        } else {
            next.payment.void(&cause, now)?;
            effects.push(SideEffect::PaymentVoided {
                payment_id: next.payment.payment_id.clone(),
            });
        }

        if let Some(shipment) = next.shipment.as_mut() {
            shipment.cancel(reason, now)?;
            effects.push(SideEffect::ShipmentCancelled {
                shipment_id: shipment.shipment_id.clone(),
                tracking_number: shipment.tracking_number.clone(),
            });
        }

        next.order.cancellation_reason = Some(reason.to_string());
        next.recompute(now);
        *self = next;

        Ok(CancellationOutcome {
            change: StatusChange {
                previous,
                current: self.order.status,
            },
            effects,
        })
    }

    fn recompute(&mut self, now: DateTime<Utc>) {
        self.order.status =
            derive_order_status(self.payment.status, self.shipment.as_ref().map(|s| s.status));
        self.order.updated_at = now;
    }
}

fn scan_for(kind: &GatewayEventKind, at: DateTime<Utc>) -> CoreResult<Scan> {
    let scan = match kind {
        GatewayEventKind::ShipmentPickedUp {
            tracking_number,
            location,
            description,
        } => Scan {
            tracking_number: Some(tracking_number.clone()),
            location: location.clone(),
            description: description.clone(),
            ..Scan::new(ShipmentStatus::PickedUp, at)
        },
        GatewayEventKind::ShipmentEvent {
            status,
            location,
            description,
        } => Scan {
            location: location.clone(),
            description: description.clone(),
            ..Scan::new(*status, at)
        },
        GatewayEventKind::ShipmentDelivered {
            location,
            description,
        } => Scan {
            location: location.clone(),
            description: description.clone(),
            ..Scan::new(ShipmentStatus::Delivered, at)
        },
        GatewayEventKind::ShipmentReturned { reason } => Scan {
            reason: Some(reason.clone()),
            ..Scan::new(ShipmentStatus::Returned, at)
        },
        other => {
            return Err(CoreError::malformed(format!(
                "{} is not a shipment event",
                other.name()
            )))
        }
    };
    Ok(scan)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn new_order(method: PaymentMethod, unit_price: i64) -> NewOrder {
        NewOrder {
            items: vec![OrderItem {
                book_id: "bk-kanyasulkam".to_string(),
                title: "Kanyasulkam".to_string(),
                author: "Gurajada Apparao".to_string(),
                quantity: 1,
                unit_price: Money::from_paise(unit_price),
            }],
            shipping_address: ShippingAddress {
                name: "Ravi".to_string(),
                phone: "9876543210".to_string(),
                line1: "4-1-22 Brodipet".to_string(),
                line2: None,
                city: "Guntur".to_string(),
                state: "Andhra Pradesh".to_string(),
                pincode: "522002".to_string(),
            },
            payment_method: method,
        }
    }

    fn place(method: PaymentMethod) -> OrderAggregate {
        // ₹500 subtotal clears the free-shipping threshold: total ₹500.00
        OrderAggregate::place(
            "ATK-2024-001".to_string(),
            new_order(method, 50_000),
            &PricingPolicy::default(),
            t(0),
        )
        .unwrap()
    }

    fn event(id: &str, at: DateTime<Utc>, kind: GatewayEventKind) -> GatewayEvent {
        GatewayEvent {
            external_id: id.to_string(),
            order_reference: "ATK-2024-001".to_string(),
            occurred_at: at,
            kind,
        }
    }

    fn captured(amount: Option<i64>) -> GatewayEvent {
        event(
            "pay_1:captured",
            t(1),
            GatewayEventKind::PaymentCaptured {
                amount: amount.map(Money::from_paise),
                fee: Money::from_paise(1_000),
                tax: Money::from_paise(180),
                gateway_reference: Some("pay_1".to_string()),
            },
        )
    }

    fn picked_up(at: DateTime<Utc>) -> GatewayEvent {
        event(
            "AWB123:picked_up",
            at,
            GatewayEventKind::ShipmentPickedUp {
                tracking_number: "AWB123".to_string(),
                location: Some("Guntur".to_string()),
                description: None,
            },
        )
    }

    fn refunded(amount: i64) -> GatewayEvent {
        event(
            "refund:rfnd_1",
            t(2),
            GatewayEventKind::PaymentRefunded {
                amount: Money::from_paise(amount),
                refund_id: Some("rfnd_1".to_string()),
            },
        )
    }

    // -------------------------------------------------------------------------
    // Derivation
    // -------------------------------------------------------------------------

    const PAYMENTS: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::PartialRefund,
    ];

    const SHIPMENTS: [Option<ShipmentStatus>; 8] = [
        None,
        Some(ShipmentStatus::Pending),
        Some(ShipmentStatus::PickedUp),
        Some(ShipmentStatus::InTransit),
        Some(ShipmentStatus::OutForDelivery),
        Some(ShipmentStatus::Delivered),
        Some(ShipmentStatus::Returned),
        Some(ShipmentStatus::Cancelled),
    ];

    #[test]
    fn test_derivation_is_deterministic() {
        for p in PAYMENTS {
            for s in SHIPMENTS {
                assert_eq!(derive_order_status(p, s), derive_order_status(p, s));
            }
        }
    }

    #[test]
    fn test_derivation_table() {
        use OrderStatus as O;
        use PaymentStatus as P;
        use ShipmentStatus as S;

        for s in SHIPMENTS {
            assert_eq!(derive_order_status(P::Refunded, s), O::Cancelled);
        }
        assert_eq!(derive_order_status(P::Failed, None), O::Cancelled);
        assert_eq!(derive_order_status(P::Pending, None), O::Pending);
        assert_eq!(derive_order_status(P::Success, None), O::Confirmed);
        assert_eq!(derive_order_status(P::Success, Some(S::Pending)), O::Processing);
        assert_eq!(derive_order_status(P::Success, Some(S::PickedUp)), O::Shipped);
        assert_eq!(derive_order_status(P::Success, Some(S::InTransit)), O::Shipped);
        assert_eq!(derive_order_status(P::Success, Some(S::OutForDelivery)), O::Shipped);
        assert_eq!(derive_order_status(P::Success, Some(S::Delivered)), O::Delivered);
        assert_eq!(derive_order_status(P::Success, Some(S::Returned)), O::Cancelled);
        assert_eq!(derive_order_status(P::Success, Some(S::Cancelled)), O::Cancelled);
        assert_eq!(derive_order_status(P::PartialRefund, Some(S::Delivered)), O::Delivered);
        assert_eq!(derive_order_status(P::Pending, Some(S::OutForDelivery)), O::Shipped);
    }

    // -------------------------------------------------------------------------
    // Lifecycle scenarios
    // -------------------------------------------------------------------------

    #[test]
    fn test_cod_order_starts_pending() {
        let agg = place(PaymentMethod::CashOnDelivery);
        assert_eq!(agg.status(), OrderStatus::Pending);
        assert_eq!(agg.payment().status, PaymentStatus::Pending);
        assert_eq!(agg.payment().amount, agg.order().totals.total);
        assert!(agg.shipment().is_none());
    }

    #[test]
    fn test_capture_confirms_order() {
        let mut agg = place(PaymentMethod::CashOnDelivery);
        let change = agg.apply(&captured(Some(50_000)), t(1)).unwrap();

        assert_eq!(agg.payment().status, PaymentStatus::Success);
        assert_eq!(change.previous, OrderStatus::Pending);
        assert_eq!(change.current, OrderStatus::Confirmed);
        assert_eq!(agg.payment().net_amount.paise(), 50_000 - 1_000 - 180);
    }

    #[test]
    fn test_dispatch_then_pickup() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.dispatch(Some(t(1) + Duration::days(4)), t(2)).unwrap();
        assert_eq!(agg.status(), OrderStatus::Processing);

        agg.apply(&picked_up(t(3)), t(3)).unwrap();
        let shipment = agg.shipment().unwrap();
        assert_eq!(shipment.status, ShipmentStatus::PickedUp);
        assert_eq!(shipment.tracking_number.as_deref(), Some("AWB123"));
        assert_eq!(agg.status(), OrderStatus::Shipped);
    }

    #[test]
    fn test_delivery_sets_delivery_date() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.dispatch(None, t(2)).unwrap();
        agg.apply(&picked_up(t(3)), t(3)).unwrap();
        agg.apply(
            &event(
                "AWB123:delivered",
                t(9),
                GatewayEventKind::ShipmentDelivered {
                    location: Some("Guntur".to_string()),
                    description: None,
                },
            ),
            t(9),
        )
        .unwrap();

        let shipment = agg.shipment().unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Delivered);
        assert_eq!(shipment.delivery_date, Some(t(9)));
        assert_eq!(agg.status(), OrderStatus::Delivered);
        assert_eq!(agg.view().tracking_events.len(), 2);
    }

    #[test]
    fn test_cancel_confirmed_order_refunds_in_full() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();

        let outcome = agg.request_cancellation("ordered twice", t(2)).unwrap();

        assert_eq!(outcome.refund(), Some(Money::from_paise(50_000)));
        assert_eq!(agg.payment().status, PaymentStatus::Refunded);
        assert_eq!(agg.payment().refund_amount, Some(agg.payment().amount));
        assert_eq!(agg.status(), OrderStatus::Cancelled);
        assert_eq!(outcome.change.current, OrderStatus::Cancelled);
        assert_eq!(agg.order().cancellation_reason.as_deref(), Some("ordered twice"));
    }

    #[test]
    fn test_refund_larger_than_payment_is_rejected() {
        let mut agg = OrderAggregate::place(
            "ATK-2024-001".to_string(),
            new_order(PaymentMethod::GatewayRedirect, 25_000),
            &PricingPolicy::default(),
            t(0),
        )
        .unwrap();
        // ₹250 + ₹50 shipping = ₹300
        assert_eq!(agg.payment().amount.paise(), 30_000);
        agg.apply(&captured(None), t(1)).unwrap();
        let before = agg.clone();

        let err = agg.apply(&refunded(50_000), t(2)).unwrap_err();
        assert!(matches!(err, CoreError::RefundExceedsCapturedAmount { .. }));
        assert_eq!(agg, before);
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    #[test]
    fn test_cancellation_refunds_before_cancelling_shipment() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.dispatch(None, t(2)).unwrap();

        let outcome = agg.request_cancellation("address unreachable", t(3)).unwrap();

        assert!(matches!(outcome.effects[0], SideEffect::RefundRequested { .. }));
        assert!(matches!(outcome.effects[1], SideEffect::ShipmentCancelled { .. }));
        assert_eq!(agg.shipment().unwrap().status, ShipmentStatus::Cancelled);
        assert_eq!(agg.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_unpaid_order_voids_payment() {
        let mut agg = place(PaymentMethod::CashOnDelivery);
        let outcome = agg.request_cancellation("changed my mind", t(1)).unwrap();

        assert_eq!(outcome.refund(), None);
        assert_eq!(agg.payment().status, PaymentStatus::Failed);
        assert_eq!(agg.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_partial_refund_refunds_remainder() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.apply(&refunded(10_000), t(2)).unwrap();
        assert_eq!(agg.status(), OrderStatus::Confirmed);

        let outcome = agg.request_cancellation("damaged", t(3)).unwrap();
        assert_eq!(outcome.refund(), Some(Money::from_paise(40_000)));
        assert_eq!(agg.payment().refund_amount, Some(Money::from_paise(50_000)));
    }

    #[test]
    fn test_shipped_order_is_not_cancellable() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.dispatch(None, t(2)).unwrap();
        agg.apply(&picked_up(t(3)), t(3)).unwrap();
        let before = agg.clone();

        let err = agg.request_cancellation("too slow", t(4)).unwrap_err();
        assert_eq!(
            err,
            CoreError::OrderNotCancellable {
                order_id: "ATK-2024-001".to_string(),
                status: OrderStatus::Shipped,
            }
        );
        assert_eq!(agg, before);
    }

    #[test]
    fn test_courier_cannot_cancel_shipment() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.dispatch(None, t(2)).unwrap();
        let before = agg.clone();

        let cancelled = event(
            "AWB123:cancelled",
            t(3),
            GatewayEventKind::ShipmentEvent {
                status: ShipmentStatus::Cancelled,
                location: None,
                description: Some("Cancelled by courier".to_string()),
            },
        );
        let err = agg.apply(&cancelled, t(3)).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidShipmentTransition {
                from: ShipmentStatus::Pending,
                to: ShipmentStatus::Cancelled,
            }
        );
        assert_eq!(agg, before);
        assert_eq!(agg.status(), OrderStatus::Processing);

        // The money still comes back through an explicit cancellation.
        let outcome = agg.request_cancellation("courier declined pickup", t(4)).unwrap();
        assert_eq!(outcome.refund(), Some(Money::from_paise(50_000)));
        assert_eq!(agg.shipment().unwrap().status, ShipmentStatus::Cancelled);
    }

    #[test]
    fn test_authorized_payment_blocks_cancellation() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        let authorized = event(
            "pay_1:authorized",
            t(1),
            GatewayEventKind::PaymentAuthorized {
                gateway_reference: Some("pay_1".to_string()),
            },
        );
        agg.apply(&authorized, t(1)).unwrap();
        assert_eq!(agg.status(), OrderStatus::Pending);
        let before = agg.clone();

        let err = agg.request_cancellation("changed my mind", t(2)).unwrap_err();
        assert_eq!(
            err,
            CoreError::PaymentInFlight {
                order_id: "ATK-2024-001".to_string(),
                gateway_reference: "pay_1".to_string(),
            }
        );
        assert_eq!(agg, before);

        // Once captured, cancelling refunds instead of voiding.
        agg.apply(&captured(None), t(3)).unwrap();
        let outcome = agg.request_cancellation("changed my mind", t(4)).unwrap();
        assert_eq!(outcome.refund(), Some(Money::from_paise(50_000)));
    }

    // -------------------------------------------------------------------------
    // Dispatch and amendments
    // -------------------------------------------------------------------------

    #[test]
    fn test_dispatch_rules() {
        let mut unpaid = place(PaymentMethod::GatewayRedirect);
        assert!(matches!(
            unpaid.dispatch(None, t(1)),
            Err(CoreError::NotDispatchable { .. })
        ));

        let mut cod = place(PaymentMethod::CashOnDelivery);
        cod.dispatch(None, t(1)).unwrap();
        assert_eq!(cod.status(), OrderStatus::Processing);
        assert!(matches!(
            cod.dispatch(None, t(2)),
            Err(CoreError::NotDispatchable { .. })
        ));
    }

    #[test]
    fn test_amend_items_reprices_pending_order() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        let mut items = agg.order().items.clone();
        items[0].quantity = 2;
        agg.amend_items(items, &PricingPolicy::default(), t(1)).unwrap();

        assert_eq!(agg.order().totals.total.paise(), 100_000);
        assert_eq!(agg.payment().amount.paise(), 100_000);

        agg.apply(&captured(None), t(2)).unwrap();
        let items = agg.order().items.clone();
        assert!(matches!(
            agg.amend_items(items, &PricingPolicy::default(), t(3)),
            Err(CoreError::ItemsLocked { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Replay helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_is_reflected_after_apply() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        let capture = captured(None);
        assert!(!agg.is_reflected(&capture));
        agg.apply(&capture, t(1)).unwrap();
        assert!(agg.is_reflected(&capture));

        agg.dispatch(None, t(2)).unwrap();
        let pickup = picked_up(t(3));
        assert!(!agg.is_reflected(&pickup));
        agg.apply(&pickup, t(3)).unwrap();
        assert!(agg.is_reflected(&pickup));
    }

    #[test]
    fn test_is_stale() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        agg.apply(&captured(None), t(1)).unwrap();
        agg.dispatch(None, t(2)).unwrap();
        agg.apply(&picked_up(t(5)), t(5)).unwrap();

        let late = event(
            "AWB123:in_transit",
            t(4),
            GatewayEventKind::ShipmentEvent {
                status: ShipmentStatus::InTransit,
                location: None,
                description: None,
            },
        );
        assert!(agg.is_stale(&late));
        assert!(matches!(
            agg.apply(&late, t(6)),
            Err(CoreError::OutOfOrderShipmentEvent { .. })
        ));
    }

    #[test]
    fn test_shipment_event_without_shipment() {
        let mut agg = place(PaymentMethod::GatewayRedirect);
        let err = agg.apply(&picked_up(t(1)), t(1)).unwrap_err();
        assert!(matches!(err, CoreError::MissingShipment { .. }));
    }

    #[test]
    fn test_restore_rederives_status() {
        let agg = place(PaymentMethod::GatewayRedirect);
        let mut order = agg.order().clone();
        order.status = OrderStatus::Delivered;
        let restored = OrderAggregate::restore(order, agg.payment().clone(), None);
        assert_eq!(restored.status(), OrderStatus::Pending);
    }
}
