//! # Error Types
//!
//! Domain-specific error types for pustakam-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pustakam-core errors (this file)                                      │
//! │  ├── CoreError        - Lifecycle rule violations + bad gateway input  │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  pustakam-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  pustakam-fulfillment errors                                           │
//! │  └── FulfillmentError - Service + gateway client failures              │
//! │                                                                         │
//! │  storefront-api errors                                                 │
//! │  └── ApiError         - What the UI sees (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → FulfillmentError → ApiError       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Categories
//! Every [`CoreError`] falls in exactly one [`ErrorCategory`]:
//! - **Validation**: the input itself is unusable (malformed payload, unknown
//!   status string, refund too large, out-of-order tracking scan).
//! - **InvariantViolation**: the input is well formed but the aggregate's
//!   current state forbids it (illegal transition, order not cancellable).
//!
//! In both cases the aggregate is left exactly as it was.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;
use crate::types::{OrderStatus, PaymentStatus, ShipmentStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Order lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A gateway payload could not be mapped to a single internal event.
    ///
    /// ## When This Occurs
    /// - Body is not valid JSON or misses a required field
    /// - A refund event without an amount
    /// - Negative fee/tax, or fee + tax larger than the captured amount
    #[error("Malformed gateway payload: {reason}")]
    MalformedGatewayPayload { reason: String },

    /// The gateway sent a status string we do not know.
    ///
    /// Surfaced instead of dropped so a new gateway status code never causes
    /// silent state drift.
    #[error("Unrecognized {gateway} status: '{status}'")]
    UnrecognizedStatus { gateway: String, status: String },

    /// Refund would take total refunds past the captured amount.
    ///
    /// ## User Workflow
    /// ```text
    /// Admin: refund ₹500 on a ₹300 payment
    ///      │
    ///      ▼
    /// RefundExceedsCapturedAmount { requested: ₹500, refundable: ₹300 }
    ///      │
    ///      ▼
    /// UI shows: "Only ₹300.00 can still be refunded"
    /// ```
    #[error("Refund of {requested} exceeds refundable balance {refundable}")]
    RefundExceedsCapturedAmount { requested: Money, refundable: Money },

    /// A tracking scan is older than the last recorded scan.
    #[error("Shipment event at {attempted} precedes last recorded event at {last}")]
    OutOfOrderShipmentEvent {
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// Captured amount does not match the amount the order asked for.
    #[error("Captured amount {actual} does not match payment amount {expected}")]
    AmountMismatch { expected: Money, actual: Money },

    /// The payment cannot accept this event in its current status.
    #[error("Payment is {from}, cannot apply {event}")]
    InvalidPaymentTransition { from: PaymentStatus, event: String },

    /// The shipment cannot move between these two statuses.
    #[error("Shipment cannot move from {from} to {to}")]
    InvalidShipmentTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },

    /// Cancellation requested after the order left the seller.
    #[error("Order {order_id} is {status} and can no longer be cancelled")]
    OrderNotCancellable { order_id: String, status: OrderStatus },

    /// Cancellation requested while an authorized payment awaits capture.
    ///
    /// Retry once the gateway settles the payment (capture or failure).
    #[error("Order {order_id} has an authorized payment ({gateway_reference}) awaiting capture")]
    PaymentInFlight {
        order_id: String,
        gateway_reference: String,
    },

    /// Shipment creation is not allowed in the order's current state.
    #[error("Order {order_id} cannot be dispatched: {reason}")]
    NotDispatchable { order_id: String, reason: String },

    /// Items are frozen once the order is confirmed.
    #[error("Order {order_id} is {status}; items can no longer be changed")]
    ItemsLocked { order_id: String, status: OrderStatus },

    /// Gateway reference was already set to a different value.
    #[error("Payment already references gateway transaction {existing}, got {received}")]
    GatewayReferenceConflict { existing: String, received: String },

    /// Courier tried to assign a second tracking number.
    #[error("Shipment already has tracking number {existing}, got {received}")]
    TrackingNumberConflict { existing: String, received: String },

    /// A shipment event arrived for an order that was never dispatched.
    #[error("Order {order_id} has no shipment")]
    MissingShipment { order_id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Broad classes of [`CoreError`], used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected at the boundary; the input itself is bad.
    Validation,
    /// Well-formed input blocked by the aggregate's current state.
    InvariantViolation,
}

impl CoreError {
    /// Creates a MalformedGatewayPayload error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedGatewayPayload {
            reason: reason.into(),
        }
    }

    /// Creates an UnrecognizedStatus error.
    pub fn unrecognized(gateway: impl Into<String>, status: impl Into<String>) -> Self {
        CoreError::UnrecognizedStatus {
            gateway: gateway.into(),
            status: status.into(),
        }
    }

    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::MalformedGatewayPayload { .. }
            | CoreError::UnrecognizedStatus { .. }
            | CoreError::RefundExceedsCapturedAmount { .. }
            | CoreError::OutOfOrderShipmentEvent { .. }
            | CoreError::AmountMismatch { .. }
            | CoreError::Validation(_) => ErrorCategory::Validation,

            CoreError::InvalidPaymentTransition { .. }
            | CoreError::InvalidShipmentTransition { .. }
            | CoreError::OrderNotCancellable { .. }
            | CoreError::PaymentInFlight { .. }
            | CoreError::NotDispatchable { .. }
            | CoreError::ItemsLocked { .. }
            | CoreError::GatewayReferenceConflict { .. }
            | CoreError::TrackingNumberConflict { .. }
            | CoreError::MissingShipment { .. } => ErrorCategory::InvariantViolation,
        }
    }

    /// Returns a stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::MalformedGatewayPayload { .. } => "MALFORMED_GATEWAY_PAYLOAD",
            CoreError::UnrecognizedStatus { .. } => "UNRECOGNIZED_STATUS",
            CoreError::RefundExceedsCapturedAmount { .. } => "REFUND_EXCEEDS_CAPTURED_AMOUNT",
            CoreError::OutOfOrderShipmentEvent { .. } => "OUT_OF_ORDER_SHIPMENT_EVENT",
            CoreError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            CoreError::InvalidPaymentTransition { .. } => "INVALID_PAYMENT_TRANSITION",
            CoreError::InvalidShipmentTransition { .. } => "INVALID_SHIPMENT_TRANSITION",
            CoreError::OrderNotCancellable { .. } => "ORDER_NOT_CANCELLABLE",
            CoreError::PaymentInFlight { .. } => "PAYMENT_IN_FLIGHT",
            CoreError::NotDispatchable { .. } => "NOT_DISPATCHABLE",
            CoreError::ItemsLocked { .. } => "ITEMS_LOCKED",
            CoreError::GatewayReferenceConflict { .. } => "GATEWAY_REFERENCE_CONFLICT",
            CoreError::TrackingNumberConflict { .. } => "TRACKING_NUMBER_CONFLICT",
            CoreError::MissingShipment { .. } => "MISSING_SHIPMENT",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any transition runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad pincode, bad order number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., same book listed twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
