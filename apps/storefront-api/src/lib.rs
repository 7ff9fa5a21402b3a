//! # Pustakam Storefront API
//!
//! axum routes over [`pustakam_fulfillment::FulfillmentService`].
//!
//! ## Module Organization
//! - [`error`] - `ApiError` and its HTTP status mapping
//! - [`routes`] - Router and handlers
//! - [`state`] - Shared application state

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorCode};
pub use routes::router;
pub use state::{AppState, SharedState};
