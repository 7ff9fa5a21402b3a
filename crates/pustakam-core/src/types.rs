//! # Domain Types
//!
//! Core domain types of the order fulfillment lifecycle.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Order Aggregate                                 │
//! │                                                                         │
//! │  ┌─────────────────┐   owns 1   ┌─────────────────┐                    │
//! │  │     Order       │───────────►│    Payment      │                    │
//! │  │  ─────────────  │            │  ─────────────  │                    │
//! │  │  order_id       │            │  payment_id     │                    │
//! │  │  status (derived)            │  status         │                    │
//! │  │  items, totals  │            │  audit_trail    │                    │
//! │  └────────┬────────┘            └─────────────────┘                    │
//! │           │ owns 0..1                                                  │
//! │           ▼                                                            │
//! │  ┌─────────────────┐            ┌─────────────────┐                    │
//! │  │    Shipment     │───────────►│ TrackingEvent[] │  append-only       │
//! │  │  shipment_id    │            │  status, at     │                    │
//! │  │  status         │            └─────────────────┘                    │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status fields are closed enums. `Order.status` is never written directly;
//! the orchestrator recomputes it from payment and shipment status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%; 1200 bps = 12% GST. Printed books are exempt, so
/// the storefront default is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// Derives `Display`/`FromStr` from the snake_case wire names.
macro_rules! status_strings {
    ($ty:ident, $label:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            /// Returns the snake_case wire name.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($s => Ok($ty::$variant),)+
                    other => Err(ValidationError::InvalidFormat {
                        field: $label.to_string(),
                        reason: format!("unknown value '{}'", other),
                    }),
                }
            }
        }
    };
}

/// The customer-visible status of an order. Always derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting payment.
    Pending,
    /// Paid, not yet handed to fulfilment.
    Confirmed,
    /// Shipment created, awaiting courier pickup.
    Processing,
    /// With the courier.
    Shipped,
    /// Delivered to the customer.
    Delivered,
    /// Cancelled, refunded, failed or returned.
    Cancelled,
}

status_strings!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Cancellation is only allowed before the courier has the parcel.
    pub const fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }
}

/// Payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
    PartialRefund,
}

status_strings!(PaymentStatus, "payment status", {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
    Refunded => "refunded",
    PartialRefund => "partial_refund",
});

impl PaymentStatus {
    /// `failed` and `refunded` accept no further events.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    /// Money has been captured (possibly partly refunded since).
    pub const fn is_captured(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::PartialRefund)
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Hosted checkout (cards, UPI, netbanking).
    GatewayRedirect,
    /// Courier collects cash and remits later.
    CashOnDelivery,
    /// Manual NEFT/IMPS transfer confirmed by the seller.
    BankTransfer,
}

status_strings!(PaymentMethod, "payment method", {
    GatewayRedirect => "gateway_redirect",
    CashOnDelivery => "cash_on_delivery",
    BankTransfer => "bank_transfer",
});

/// Shipment lifecycle status.
///
/// ## Transition Graph
/// ```text
/// pending ──► picked_up ──► in_transit ──► out_for_delivery ──► delivered
///    │            │  │           │                 │
///    │            │  └───────────┴─────────────────┴──► returned
///    └────────────┴──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Returned,
    Cancelled,
}

status_strings!(ShipmentStatus, "shipment status", {
    Pending => "pending",
    PickedUp => "picked_up",
    InTransit => "in_transit",
    OutForDelivery => "out_for_delivery",
    Delivered => "delivered",
    Returned => "returned",
    Cancelled => "cancelled",
});

impl ShipmentStatus {
    /// `delivered`, `returned` and `cancelled` accept no further events.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered | ShipmentStatus::Returned | ShipmentStatus::Cancelled
        )
    }

    /// Position on the forward delivery chain; `None` for the side branches.
    pub const fn stage(&self) -> Option<u8> {
        match self {
            ShipmentStatus::Pending => Some(0),
            ShipmentStatus::PickedUp => Some(1),
            ShipmentStatus::InTransit => Some(2),
            ShipmentStatus::OutForDelivery => Some(3),
            ShipmentStatus::Delivered => Some(4),
            ShipmentStatus::Returned | ShipmentStatus::Cancelled => None,
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A book in an order. Title and author are snapshots taken at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl OrderItem {
    /// unit_price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Shipping fee and tax policy applied when totals are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Flat shipping fee charged below the free-shipping threshold.
    pub flat_shipping_fee: Money,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Money,
    /// Tax applied to the subtotal.
    pub tax_rate: TaxRate,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        PricingPolicy {
            flat_shipping_fee: Money::from_rupees(50),
            free_shipping_threshold: Money::from_rupees(499),
            tax_rate: TaxRate::zero(),
        }
    }
}

/// Order totals. `total == subtotal + shipping + tax` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Computes totals for a set of items under a pricing policy.
    pub fn compute(items: &[OrderItem], pricing: &PricingPolicy) -> Self {
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        let shipping = if subtotal >= pricing.free_shipping_threshold {
            Money::zero()
        } else {
            pricing.flat_shipping_fee
        };
        let tax = subtotal.calculate_tax(pricing.tax_rate);

        OrderTotals {
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        }
    }

    /// Checks the sum invariant and non-negativity.
    pub fn is_consistent(&self) -> bool {
        !self.subtotal.is_negative()
            && !self.shipping.is_negative()
            && !self.tax.is_negative()
            && self.total == self.subtotal + self.shipping + self.tax
    }
}

/// Where the parcel goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

/// A customer's order. The top-level aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Externally visible order number, e.g. `ATK-2024-001`.
    pub order_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub shipping_address: ShippingAddress,
    pub cancellation_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One row of the admin order list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub status: OrderStatus,
    pub total: Money,
    pub item_count: i64,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipment_status: Option<ShipmentStatus>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment
// =============================================================================

/// One successful payment transition, kept forever for dispute resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuditEntry {
    pub from_status: PaymentStatus,
    pub to_status: PaymentStatus,
    /// What caused the transition, e.g. `captured`, `refund`, `order cancelled`.
    pub cause: String,
    /// Amount moved by this transition, when there is one.
    pub amount: Option<Money>,
    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

/// The monetary transaction of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub amount: Money,
    pub fee: Money,
    pub tax: Money,
    pub net_amount: Money,
    /// Cumulative refunds; present only for `refunded` / `partial_refund`.
    pub refund_amount: Option<Money>,
    /// Gateway transaction id. Set once, never changed.
    pub gateway_reference: Option<String>,
    pub audit_trail: Vec<PaymentAuditEntry>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Shipment
// =============================================================================

/// One courier scan. Never mutated or reordered once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub status: ShipmentStatus,
    pub location: Option<String>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// The physical fulfilment of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub shipment_id: String,
    pub order_id: String,
    pub status: ShipmentStatus,
    /// Courier AWB; assigned at pickup.
    pub tracking_number: Option<String>,
    pub tracking_events: Vec<TrackingEvent>,
    #[ts(as = "Option<String>")]
    pub expected_delivery: Option<DateTime<Utc>>,
    /// Set exactly once, on delivery.
    #[ts(as = "Option<String>")]
    pub delivery_date: Option<DateTime<Utc>>,
    pub return_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
