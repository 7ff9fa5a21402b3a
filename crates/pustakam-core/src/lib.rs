//! # pustakam-core: Order Lifecycle Logic for the Pustakam Storefront
//!
//! The coupled order / payment / shipment state machines as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Pustakam Fulfillment Architecture                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            storefront-api (axum) + webhooks                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     pustakam-fulfillment: locks, dedup, reconciliation          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pustakam-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │   │
//! │  │   │ gateway  │─►│  ledger  │  │ tracker  │  │ orchestrator │   │   │
//! │  │   │ normalize│  │ Payment  │  │ Shipment │  │ derive status│   │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              pustakam-db (SQLite aggregate store)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Order, Payment, Shipment and their status enums
//! - [`money`] - Paise-based Money type
//! - [`error`] - Lifecycle error taxonomy
//! - [`validation`] - Input rules (items, address, order numbers)
//! - [`gateway`] - Gateway Adapter: payloads → [`gateway::GatewayEvent`]
//! - [`ledger`] - Payment Ledger state machine
//! - [`tracker`] - Shipment Tracker state machine
//! - [`orchestrator`] - Order aggregate and status derivation
//!
//! ## Example Usage
//!
//! ```rust
//! use pustakam_core::orchestrator::derive_order_status;
//! use pustakam_core::types::{OrderStatus, PaymentStatus, ShipmentStatus};
//!
//! let status = derive_order_status(PaymentStatus::Success, Some(ShipmentStatus::Pending));
//! assert_eq!(status, OrderStatus::Processing);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod gateway;
pub mod ledger;
pub mod money;
pub mod orchestrator;
pub mod tracker;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorCategory, ValidationError};
pub use gateway::{GatewayEvent, GatewayEventKind, WebhookSource};
pub use money::Money;
pub use orchestrator::{
    derive_order_status, CancellationOutcome, NewOrder, OrderAggregate, OrderView, SideEffect,
    StatusChange,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Prefix of every order number (`ATK-2024-001`).
pub const ORDER_NUMBER_PREFIX: &str = "ATK";

/// Maximum distinct books in one order.
pub const MAX_ORDER_ITEMS: usize = 50;

/// Maximum copies of one book per order.
///
/// ## Business Reason
/// Bulk orders for libraries go through the admin console, not checkout.
pub const MAX_ITEM_QUANTITY: i64 = 20;

/// Most expensive single copy accepted at checkout: ₹1,00,000 in paise.
///
/// Keeps order totals far inside `i64` at the item and quantity caps.
pub const MAX_UNIT_PRICE_PAISE: i64 = 10_000_000;
