//! # pustakam-fulfillment: Order Fulfillment for Pustakam
//!
//! Drives orders from checkout to doorstep: accepts orders, applies payment
//! and courier notifications, and reconciles with the gateway when
//! notifications go missing.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Fulfillment Architecture                          │
//! │                                                                         │
//! │   storefront-api (axum)                                                │
//! │        │ place / cancel / status / dispatch / webhooks                 │
//! │        ▼                                                                │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 FulfillmentService (service.rs)                  │  │
//! │  │                                                                  │  │
//! │  │  lock order ─► dedup check ─► load ─► apply ─► save + record    │  │
//! │  └───────────────▲─────────────────────────────┬────────────────────┘  │
//! │                  │ Delivery::Poll              │                       │
//! │  ┌───────────────┴──────────────┐   ┌──────────▼───────────────────┐  │
//! │  │ Reconciler / Worker          │   │ pustakam-db                  │  │
//! │  │ (reconciliation.rs)          │   │ orders · gateway_events ·    │  │
//! │  │ stale payments + shipments   │   │ refund_requests              │  │
//! │  │ refund outbox submission     │   └──────────────────────────────┘  │
//! │  └───────────────┬──────────────┘                                      │
//! │                  ▼                                                      │
//! │  ┌──────────────────────────────┐                                      │
//! │  │ GatewayClient (client.rs)    │                                      │
//! │  │ HttpGatewayClient (http.rs)  │──► payment gateway / courier API     │
//! │  └──────────────────────────────┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`client`] - Gateway/courier client trait
//! - [`config`] - Service configuration (TOML + environment)
//! - [`error`] - Fulfillment error types
//! - [`http`] - reqwest client with retry/backoff
//! - [`locks`] - Per-order mutual exclusion
//! - [`reconciliation`] - Polling job and its background worker
//! - [`service`] - Order operations and event application
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pustakam_fulfillment::{FulfillmentConfig, FulfillmentService, Reconciler};
//!
//! let config = FulfillmentConfig::load_or_default(None);
//! let service = FulfillmentService::new(database, config.pricing_policy());
//!
//! let order = service.place_order(new_order).await?;
//! println!("Placed {}", order.order_id);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod locks;
pub mod reconciliation;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::GatewayClient;
pub use config::{
    DatabaseSettings, FulfillmentConfig, GatewaySettings, PricingSettings, ReconciliationSettings,
    ServerSettings,
};
pub use error::{FulfillmentError, FulfillmentResult};
pub use http::HttpGatewayClient;
pub use locks::OrderLocks;
pub use reconciliation::{
    ReconciliationHandle, ReconciliationReport, ReconciliationWorker, Reconciler,
};
pub use service::{Delivery, EventOutcome, FulfillmentService, WebhookAck, MAX_LIST_LIMIT};
