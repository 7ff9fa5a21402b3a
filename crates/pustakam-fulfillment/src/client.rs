//! # Gateway Client
//!
//! Outbound calls to the payment gateway and the courier. Only the
//! reconciliation job calls these; webhook handling never waits on the
//! gateway.

use async_trait::async_trait;

use pustakam_core::gateway::{CourierSnapshot, PaymentSnapshot};
use pustakam_db::RefundRequest;

use crate::error::FulfillmentResult;

/// Polls external state and submits refunds.
///
/// `Ok(None)` means the gateway has no record yet, which is not an error:
/// the order stays pending until the next pass.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Current payment state for an order.
    async fn fetch_payment(
        &self,
        order_id: &str,
        gateway_reference: Option<&str>,
    ) -> FulfillmentResult<Option<PaymentSnapshot>>;

    /// Current tracking state for a shipment. Looked up by AWB once the
    /// courier assigned one, by order number before that.
    async fn track_shipment(
        &self,
        order_id: &str,
        tracking_number: Option<&str>,
    ) -> FulfillmentResult<Option<CourierSnapshot>>;

    /// Submits a queued refund and returns the gateway's refund id.
    ///
    /// `refund.request_id` is sent as the idempotency key.
    async fn request_refund(&self, refund: &RefundRequest) -> FulfillmentResult<String>;
}
