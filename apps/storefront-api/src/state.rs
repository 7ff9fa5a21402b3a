//! # Application State
//!
//! Shared by every handler through axum's `State` extractor.

use std::sync::Arc;

use pustakam_fulfillment::{FulfillmentService, ReconciliationHandle};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: FulfillmentService,
    /// Queues on-demand passes on the background worker, so they never
    /// overlap a timed one.
    pub reconciliation: ReconciliationHandle,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(service: FulfillmentService, reconciliation: ReconciliationHandle) -> SharedState {
        Arc::new(AppState {
            service,
            reconciliation,
        })
    }
}
