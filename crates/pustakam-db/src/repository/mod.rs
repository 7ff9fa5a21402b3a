//! # Repository Module
//!
//! Database repositories for the fulfillment core.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  FulfillmentService                                                    │
//! │       │                                                                 │
//! │       │  db.orders().load("ATK-2024-001")                              │
//! │       ▼                                                                 │
//! │  OrderRepository                                                       │
//! │  ├── allocate_order_id(year)                                           │
//! │  ├── insert(&aggregate)                                                │
//! │  ├── load(order_id)                                                    │
//! │  ├── save / save_with_event / save_with_refunds  ← one transaction     │
//! │  ├── list(status, limit)                                               │
//! │  └── stale_payments / stale_shipments                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`orders::OrderRepository`] - Aggregate load/save and queries
//! - [`gateway_events::GatewayEventRepository`] - Processed-event dedup
//! - [`refunds::RefundRequestRepository`] - Refund outbox

pub mod gateway_events;
pub mod orders;
pub mod refunds;
