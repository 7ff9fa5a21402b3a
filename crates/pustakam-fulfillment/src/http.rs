//! # HTTP Gateway Client
//!
//! [`GatewayClient`] over `reqwest`, retrying transient failures with
//! exponential backoff.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  payment_base_url                                                      │
//! │    GET  v1/payments/{gatewayReference}     → PaymentSnapshot           │
//! │    GET  v1/orders/{orderId}/payment        → PaymentSnapshot           │
//! │    POST v1/refunds  (Idempotency-Key)      → { refundId }              │
//! │                                                                         │
//! │  courier_base_url                                                      │
//! │    GET  v1/track/awb/{awb}                 → CourierSnapshot           │
//! │    GET  v1/track/order/{orderId}           → CourierSnapshot           │
//! │                                                                         │
//! │  404            → Ok(None)                                             │
//! │  5xx, 429, I/O  → retried until max_elapsed, then GatewayUnavailable   │
//! │  other 4xx      → GatewayRejected, not retried                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use pustakam_core::gateway::{CourierSnapshot, PaymentSnapshot};
use pustakam_db::RefundRequest;

use crate::client::GatewayClient;
use crate::config::GatewaySettings;
use crate::error::{FulfillmentError, FulfillmentResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundBody<'a> {
    order_reference: &'a str,
    gateway_reference: Option<&'a str>,
    /// Paise.
    amount: i64,
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundReceipt {
    refund_id: String,
}

/// Gateway client for the configured payment and courier endpoints.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    http: reqwest::Client,
    payment_base: Url,
    courier_base: Url,
    api_key: Option<String>,
    initial_backoff: Duration,
    max_elapsed: Duration,
}

impl HttpGatewayClient {
    pub fn new(settings: &GatewaySettings) -> FulfillmentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| FulfillmentError::InvalidConfig(e.to_string()))?;

        Ok(HttpGatewayClient {
            http,
            payment_base: base_url(&settings.payment_base_url)?,
            courier_base: base_url(&settings.courier_base_url)?,
            api_key: settings.api_key.clone(),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_elapsed: Duration::from_secs(settings.max_elapsed_secs),
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.max_elapsed,
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> FulfillmentResult<Option<T>> {
        debug!(%url, "Polling gateway");
        let url = &url;

        backoff::future::retry(self.backoff(), move || async move {
            let response = self
                .authorize(self.http.get(url.clone()))
                .send()
                .await
                .map_err(classify)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let body = response
                .error_for_status()
                .map_err(classify)?
                .json::<T>()
                .await
                .map_err(classify)?;
            Ok::<_, backoff::Error<FulfillmentError>>(Some(body))
        })
        .await
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn fetch_payment(
        &self,
        order_id: &str,
        gateway_reference: Option<&str>,
    ) -> FulfillmentResult<Option<PaymentSnapshot>> {
        let path = match gateway_reference {
            Some(reference) => format!("v1/payments/{}", reference),
            None => format!("v1/orders/{}/payment", order_id),
        };
        self.get_json(self.payment_base.join(&path)?).await
    }

    async fn track_shipment(
        &self,
        order_id: &str,
        tracking_number: Option<&str>,
    ) -> FulfillmentResult<Option<CourierSnapshot>> {
        let path = match tracking_number {
            Some(awb) => format!("v1/track/awb/{}", awb),
            None => format!("v1/track/order/{}", order_id),
        };
        self.get_json(self.courier_base.join(&path)?).await
    }

    async fn request_refund(&self, refund: &RefundRequest) -> FulfillmentResult<String> {
        let url = self.payment_base.join("v1/refunds")?;
        let body = RefundBody {
            order_reference: &refund.order_id,
            gateway_reference: refund.gateway_reference.as_deref(),
            amount: refund.amount.paise(),
            reason: &refund.reason,
        };

        debug!(
            request_id = %refund.request_id,
            order_id = %refund.order_id,
            amount = %refund.amount,
            "Submitting refund"
        );

        let (url, body) = (&url, &body);
        let receipt = backoff::future::retry(self.backoff(), move || async move {
            let receipt = self
                .authorize(self.http.post(url.clone()))
                .header("Idempotency-Key", &refund.request_id)
                .json(body)
                .send()
                .await
                .map_err(classify)?
                .error_for_status()
                .map_err(classify)?
                .json::<RefundReceipt>()
                .await
                .map_err(classify)?;
            Ok::<_, backoff::Error<FulfillmentError>>(receipt)
        })
        .await?;

        Ok(receipt.refund_id)
    }
}

/// Parses a base URL, making sure relative joins append to its path.
fn base_url(raw: &str) -> FulfillmentResult<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn classify(err: reqwest::Error) -> backoff::Error<FulfillmentError> {
    let err = FulfillmentError::from(err);
    if err.is_retryable() {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}
