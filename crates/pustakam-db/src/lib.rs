//! # pustakam-db: Aggregate Store for Pustakam Fulfillment
//!
//! Persists order aggregates in SQLite with sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pustakam Data Flow                                 │
//! │                                                                         │
//! │  FulfillmentService (holding the per-order lock)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   pustakam-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ OrderRepo      │   │ 001_*.sql    │   │   │
//! │  │   │ SqlitePool    │◄───│ GatewayEvents  │   │              │   │   │
//! │  │   │               │    │ RefundRequests │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (pustakam.db, WAL)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Orders, processed gateway events, refund outbox
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pustakam_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("pustakam.db")).await?;
//! let aggregate = db.orders().load("ATK-2024-001").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::gateway_events::{GatewayEventRepository, ProcessedEvent};
pub use repository::orders::OrderRepository;
pub use repository::refunds::{NewRefundRequest, RefundRequest, RefundRequestRepository};
