//! # Gateway Adapter
//!
//! Translates payment-gateway and courier payloads into one closed event
//! vocabulary.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Gateway Adapter                                  │
//! │                                                                         │
//! │  payment webhook ──┐                                                    │
//! │  courier webhook ──┼──► parse ──► map status ──► GatewayEvent           │
//! │  payment snapshot ─┤      │           │          (external_id, kind)    │
//! │  courier snapshot ─┘      ▼           ▼                                 │
//! │                   Malformed      Unrecognized                           │
//! │                   GatewayPayload Status                                 │
//! │                                                                         │
//! │  Nothing here touches an aggregate. A payload yields exactly one event  │
//! │  (webhooks) or an ordered list (snapshots), or an error.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deduplication Keys
//! `external_id` is derived from the *content* of the event where possible so
//! that a webhook and a later reconciliation poll of the same fact collapse
//! to one key:
//!
//! | Event | Key |
//! |---|---|
//! | authorized | `{gatewayReference}:authorized` |
//! | captured | `{gatewayReference}:captured` |
//! | failed | `{gatewayReference}:failed` |
//! | refunded | `refund:{refundId}` |
//! | courier scan | `{awb or orderReference}:{status}:{timestamp}` |
//!
//! Payment events without a gateway reference (or refund id) fall back to
//! the gateway's `eventId`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::ShipmentStatus;

const PAYMENT_GATEWAY: &str = "payment gateway";
const COURIER: &str = "courier";

// =============================================================================
// Internal Event Vocabulary
// =============================================================================

/// Which gateway sent a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    Payment,
    Courier,
}

/// A normalized gateway event addressed to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Deduplication key; see module docs.
    pub external_id: String,
    /// Our order number as the gateway echoes it back.
    pub order_reference: String,
    pub occurred_at: DateTime<Utc>,
    pub kind: GatewayEventKind,
}

/// The closed set of things a gateway can tell us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEventKind {
    PaymentAuthorized {
        gateway_reference: Option<String>,
    },
    PaymentCaptured {
        amount: Option<Money>,
        fee: Money,
        tax: Money,
        gateway_reference: Option<String>,
    },
    PaymentFailed {
        reason: String,
        gateway_reference: Option<String>,
    },
    PaymentRefunded {
        amount: Money,
        refund_id: Option<String>,
    },
    ShipmentPickedUp {
        tracking_number: String,
        location: Option<String>,
        description: Option<String>,
    },
    ShipmentEvent {
        status: ShipmentStatus,
        location: Option<String>,
        description: Option<String>,
    },
    ShipmentDelivered {
        location: Option<String>,
        description: Option<String>,
    },
    ShipmentReturned {
        reason: String,
    },
}

impl GatewayEventKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEventKind::PaymentAuthorized { .. } => "payment_authorized",
            GatewayEventKind::PaymentCaptured { .. } => "payment_captured",
            GatewayEventKind::PaymentFailed { .. } => "payment_failed",
            GatewayEventKind::PaymentRefunded { .. } => "payment_refunded",
            GatewayEventKind::ShipmentPickedUp { .. } => "shipment_picked_up",
            GatewayEventKind::ShipmentEvent { .. } => "shipment_event",
            GatewayEventKind::ShipmentDelivered { .. } => "shipment_delivered",
            GatewayEventKind::ShipmentReturned { .. } => "shipment_returned",
        }
    }

    /// True for events the Shipment Tracker handles.
    pub fn is_shipment_event(&self) -> bool {
        matches!(
            self,
            GatewayEventKind::ShipmentPickedUp { .. }
                | GatewayEventKind::ShipmentEvent { .. }
                | GatewayEventKind::ShipmentDelivered { .. }
                | GatewayEventKind::ShipmentReturned { .. }
        )
    }

    /// The shipment status this event moves to, if it is a shipment event.
    pub fn shipment_status(&self) -> Option<ShipmentStatus> {
        match self {
            GatewayEventKind::ShipmentPickedUp { .. } => Some(ShipmentStatus::PickedUp),
            GatewayEventKind::ShipmentEvent { status, .. } => Some(*status),
            GatewayEventKind::ShipmentDelivered { .. } => Some(ShipmentStatus::Delivered),
            GatewayEventKind::ShipmentReturned { .. } => Some(ShipmentStatus::Returned),
            _ => None,
        }
    }
}

// =============================================================================
// Payment Gateway Payloads
// =============================================================================

/// Payment gateway webhook body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    pub event_id: String,
    pub event_type: String,
    pub order_reference: String,
    /// Paise.
    pub amount: Option<i64>,
    pub fee: Option<i64>,
    pub tax: Option<i64>,
    pub gateway_reference: Option<String>,
    pub refund_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A refund as listed in a payment snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundSnapshot {
    pub refund_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Payment state returned by the gateway's status endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSnapshot {
    pub order_reference: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub tax: i64,
    pub gateway_reference: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub refunds: Vec<RefundSnapshot>,
}

// =============================================================================
// Courier Payloads
// =============================================================================

/// Courier push notification body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierWebhook {
    pub event_id: Option<String>,
    pub order_reference: String,
    pub awb: Option<String>,
    pub current_status: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
    pub reason: Option<String>,
}

/// One scan in a courier tracking response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierScan {
    pub status: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
}

/// Courier tracking API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierSnapshot {
    pub tracking_number: Option<String>,
    pub status: String,
    #[serde(default)]
    pub history: Vec<CourierScan>,
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalizes a raw webhook body into a single event.
///
/// `received_at` stands in for the event time when the payment gateway
/// omits `createdAt`.
pub fn normalize_webhook(
    source: WebhookSource,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> CoreResult<GatewayEvent> {
    match source {
        WebhookSource::Payment => {
            let payload: PaymentWebhook = parse(body)?;
            normalize_payment_webhook(&payload, received_at)
        }
        WebhookSource::Courier => {
            let payload: CourierWebhook = parse(body)?;
            normalize_courier_webhook(&payload)
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(body).map_err(|e| CoreError::malformed(e.to_string()))
}

/// Maps a payment webhook to an event.
pub fn normalize_payment_webhook(
    payload: &PaymentWebhook,
    received_at: DateTime<Utc>,
) -> CoreResult<GatewayEvent> {
    require_text("eventId", &payload.event_id)?;
    require_text("orderReference", &payload.order_reference)?;

    let reference = non_empty(payload.gateway_reference.as_deref());
    let keyed = |suffix: &str| match reference {
        Some(r) => format!("{}:{}", r, suffix),
        None => payload.event_id.clone(),
    };

    let (external_id, kind) = match payment_event_type(&payload.event_type)? {
        PaymentEventType::Authorized => (
            keyed("authorized"),
            GatewayEventKind::PaymentAuthorized {
                gateway_reference: reference.map(str::to_string),
            },
        ),
        PaymentEventType::Captured => (
            keyed("captured"),
            GatewayEventKind::PaymentCaptured {
                amount: payload.amount.map(paise).transpose()?,
                fee: paise(payload.fee.unwrap_or(0))?,
                tax: paise(payload.tax.unwrap_or(0))?,
                gateway_reference: reference.map(str::to_string),
            },
        ),
        PaymentEventType::Failed => (
            keyed("failed"),
            GatewayEventKind::PaymentFailed {
                reason: payload
                    .reason
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "declined by gateway".to_string()),
                gateway_reference: reference.map(str::to_string),
            },
        ),
        PaymentEventType::Refunded => {
            let amount = payload
                .amount
                .ok_or_else(|| CoreError::malformed("refund event without amount"))?;
            let refund_id = non_empty(payload.refund_id.as_deref());
            (
                refund_id
                    .map(|id| format!("refund:{}", id))
                    .unwrap_or_else(|| payload.event_id.clone()),
                GatewayEventKind::PaymentRefunded {
                    amount: paise(amount)?,
                    refund_id: refund_id.map(str::to_string),
                },
            )
        }
    };

    Ok(GatewayEvent {
        external_id,
        order_reference: payload.order_reference.clone(),
        occurred_at: payload.created_at.unwrap_or(received_at),
        kind,
    })
}

/// Maps a courier push notification to an event.
pub fn normalize_courier_webhook(payload: &CourierWebhook) -> CoreResult<GatewayEvent> {
    require_text("orderReference", &payload.order_reference)?;
    let status = courier_status(&payload.current_status)?;
    let awb = non_empty(payload.awb.as_deref());

    let kind = courier_event_kind(
        status,
        awb,
        payload.location.clone(),
        payload.description.clone(),
        payload.reason.as_deref().or(payload.description.as_deref()),
        &payload.current_status,
    )?;

    Ok(GatewayEvent {
        external_id: scan_key(awb, &payload.order_reference, status, payload.timestamp),
        order_reference: payload.order_reference.clone(),
        occurred_at: payload.timestamp,
        kind,
    })
}

/// Expands a payment status poll into the events it implies, oldest first.
///
/// `polled_at` timestamps the capture/failure when the gateway does not.
pub fn normalize_payment_snapshot(
    snapshot: &PaymentSnapshot,
    polled_at: DateTime<Utc>,
) -> CoreResult<Vec<GatewayEvent>> {
    let reference = non_empty(snapshot.gateway_reference.as_deref());
    let keyed = |suffix: &str| match reference {
        Some(r) => format!("{}:{}", r, suffix),
        None => format!("{}:{}", snapshot.order_reference, suffix),
    };
    let event = |external_id: String, occurred_at, kind| GatewayEvent {
        external_id,
        order_reference: snapshot.order_reference.clone(),
        occurred_at,
        kind,
    };

    let mut events = Vec::new();
    match normalize_token(&snapshot.status).as_str() {
        "CREATED" | "PENDING" | "ATTEMPTED" => {}
        "AUTHORIZED" => events.push(event(
            keyed("authorized"),
            polled_at,
            GatewayEventKind::PaymentAuthorized {
                gateway_reference: reference.map(str::to_string),
            },
        )),
        "CAPTURED" | "PAID" | "SUCCESS" | "REFUNDED" | "PARTIALLY REFUNDED" => {
            events.push(event(
                keyed("captured"),
                polled_at,
                GatewayEventKind::PaymentCaptured {
                    amount: Some(paise(snapshot.amount)?),
                    fee: paise(snapshot.fee)?,
                    tax: paise(snapshot.tax)?,
                    gateway_reference: reference.map(str::to_string),
                },
            ));
            let mut refunds: Vec<&RefundSnapshot> = snapshot.refunds.iter().collect();
            refunds.sort_by_key(|r| r.created_at);
            for refund in refunds {
                require_text("refundId", &refund.refund_id)?;
                events.push(event(
                    format!("refund:{}", refund.refund_id),
                    refund.created_at,
                    GatewayEventKind::PaymentRefunded {
                        amount: paise(refund.amount)?,
                        refund_id: Some(refund.refund_id.clone()),
                    },
                ));
            }
        }
        "FAILED" => events.push(event(
            keyed("failed"),
            polled_at,
            GatewayEventKind::PaymentFailed {
                reason: snapshot
                    .reason
                    .clone()
                    .unwrap_or_else(|| "declined by gateway".to_string()),
                gateway_reference: reference.map(str::to_string),
            },
        )),
        _ => return Err(CoreError::unrecognized(PAYMENT_GATEWAY, &snapshot.status)),
    }

    Ok(events)
}

/// Expands a courier tracking response into scan events, oldest first.
///
/// When the courier returns no history the current status becomes a single
/// scan stamped `polled_at`.
pub fn normalize_courier_snapshot(
    snapshot: &CourierSnapshot,
    order_reference: &str,
    polled_at: DateTime<Utc>,
) -> CoreResult<Vec<GatewayEvent>> {
    let awb = non_empty(snapshot.tracking_number.as_deref());

    let fallback = [CourierScan {
        status: snapshot.status.clone(),
        location: None,
        timestamp: polled_at,
        description: None,
    }];
    let mut scans: Vec<&CourierScan> = if snapshot.history.is_empty() {
        fallback.iter().collect()
    } else {
        snapshot.history.iter().collect()
    };
    scans.sort_by_key(|s| s.timestamp);

    scans
        .into_iter()
        .map(|scan| -> CoreResult<GatewayEvent> {
            let status = courier_status(&scan.status)?;
            let kind = courier_event_kind(
                status,
                awb,
                scan.location.clone(),
                scan.description.clone(),
                scan.description.as_deref(),
                &scan.status,
            )?;
            Ok(GatewayEvent {
                external_id: scan_key(awb, order_reference, status, scan.timestamp),
                order_reference: order_reference.to_string(),
                occurred_at: scan.timestamp,
                kind,
            })
        })
        .collect()
}

// =============================================================================
// Status Vocabularies
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaymentEventType {
    Authorized,
    Captured,
    Failed,
    Refunded,
}

fn payment_event_type(event_type: &str) -> CoreResult<PaymentEventType> {
    match event_type.trim().to_ascii_lowercase().as_str() {
        "payment.authorized" => Ok(PaymentEventType::Authorized),
        "payment.captured" | "order.paid" => Ok(PaymentEventType::Captured),
        "payment.failed" => Ok(PaymentEventType::Failed),
        "refund.processed" | "refund.created" => Ok(PaymentEventType::Refunded),
        _ => Err(CoreError::unrecognized(PAYMENT_GATEWAY, event_type)),
    }
}

/// Maps a courier status string, ignoring case and `_`/`-` separators.
///
/// Return-to-origin (`RTO ...`) statuses all map to `returned`.
pub fn courier_status(raw: &str) -> CoreResult<ShipmentStatus> {
    let token = normalize_token(raw);
    let status = match token.as_str() {
        "PENDING" | "NEW" | "AWB ASSIGNED" | "MANIFESTED" | "PICKUP SCHEDULED"
        | "PICKUP GENERATED" | "OUT FOR PICKUP" => ShipmentStatus::Pending,
        "PICKED UP" | "PICKUP COMPLETE" | "PICKUP COMPLETED" | "SHIPMENT PICKED UP" => {
            ShipmentStatus::PickedUp
        }
        "IN TRANSIT" | "SHIPPED" | "REACHED DESTINATION HUB" | "REACHED AT DESTINATION HUB" => {
            ShipmentStatus::InTransit
        }
        "OUT FOR DELIVERY" => ShipmentStatus::OutForDelivery,
        "DELIVERED" => ShipmentStatus::Delivered,
        "RETURNED" => ShipmentStatus::Returned,
        t if t.starts_with("RTO") => ShipmentStatus::Returned,
        "CANCELLED" | "CANCELED" => ShipmentStatus::Cancelled,
        _ => return Err(CoreError::unrecognized(COURIER, raw)),
    };
    Ok(status)
}

fn courier_event_kind(
    status: ShipmentStatus,
    awb: Option<&str>,
    location: Option<String>,
    description: Option<String>,
    reason: Option<&str>,
    raw_status: &str,
) -> CoreResult<GatewayEventKind> {
    let kind = match status {
        ShipmentStatus::PickedUp => GatewayEventKind::ShipmentPickedUp {
            tracking_number: awb
                .ok_or_else(|| CoreError::malformed("pickup without tracking number"))?
                .to_string(),
            location,
            description,
        },
        ShipmentStatus::Delivered => GatewayEventKind::ShipmentDelivered {
            location,
            description,
        },
        ShipmentStatus::Returned => GatewayEventKind::ShipmentReturned {
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(raw_status)
                .to_string(),
        },
        status => GatewayEventKind::ShipmentEvent {
            status,
            location,
            description,
        },
    };
    Ok(kind)
}

fn normalize_token(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn scan_key(
    awb: Option<&str>,
    order_reference: &str,
    status: ShipmentStatus,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}:{}:{}",
        awb.unwrap_or(order_reference),
        status,
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn paise(value: i64) -> CoreResult<Money> {
    if value < 0 {
        return Err(CoreError::malformed(format!("negative amount {}", value)));
    }
    Ok(Money::from_paise(value))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require_text(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::malformed(format!("{} is empty", field)));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_payment_captured_webhook() {
        let event = normalize_webhook(
            WebhookSource::Payment,
            &body(json!({
                "eventId": "evt_1",
                "eventType": "payment.captured",
                "orderReference": "ATK-2024-001",
                "amount": 30000,
                "fee": 590,
                "tax": 106,
                "gatewayReference": "pay_ABC"
            })),
            now(),
        )
        .unwrap();

        assert_eq!(event.external_id, "pay_ABC:captured");
        assert_eq!(event.order_reference, "ATK-2024-001");
        assert_eq!(event.occurred_at, now());
        assert_eq!(
            event.kind,
            GatewayEventKind::PaymentCaptured {
                amount: Some(Money::from_paise(30_000)),
                fee: Money::from_paise(590),
                tax: Money::from_paise(106),
                gateway_reference: Some("pay_ABC".to_string()),
            }
        );
    }

    #[test]
    fn test_refund_webhook_keyed_by_refund_id() {
        let event = normalize_webhook(
            WebhookSource::Payment,
            &body(json!({
                "eventId": "evt_9",
                "eventType": "refund.processed",
                "orderReference": "ATK-2024-001",
                "amount": 10000,
                "refundId": "rfnd_1"
            })),
            now(),
        )
        .unwrap();
        assert_eq!(event.external_id, "refund:rfnd_1");
        assert!(matches!(event.kind, GatewayEventKind::PaymentRefunded { .. }));
    }

    #[test]
    fn test_malformed_payloads() {
        let err = normalize_webhook(WebhookSource::Payment, b"not json", now()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedGatewayPayload { .. }));

        let err = normalize_webhook(
            WebhookSource::Payment,
            &body(json!({
                "eventId": "evt_2",
                "eventType": "refund.processed",
                "orderReference": "ATK-2024-001"
            })),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedGatewayPayload { .. }));

        let err = normalize_webhook(
            WebhookSource::Payment,
            &body(json!({
                "eventId": "evt_3",
                "eventType": "payment.captured",
                "orderReference": "ATK-2024-001",
                "amount": -5
            })),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedGatewayPayload { .. }));
    }

    #[test]
    fn test_unknown_event_type_is_surfaced() {
        let err = normalize_webhook(
            WebhookSource::Payment,
            &body(json!({
                "eventId": "evt_4",
                "eventType": "payment.disputed",
                "orderReference": "ATK-2024-001"
            })),
            now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CoreError::unrecognized("payment gateway", "payment.disputed")
        );
    }

    #[test]
    fn test_courier_status_spellings() {
        assert_eq!(courier_status("Picked Up").unwrap(), ShipmentStatus::PickedUp);
        assert_eq!(courier_status("PICKED_UP").unwrap(), ShipmentStatus::PickedUp);
        assert_eq!(courier_status("out-for-delivery").unwrap(), ShipmentStatus::OutForDelivery);
        assert_eq!(courier_status("RTO Initiated").unwrap(), ShipmentStatus::Returned);
        assert!(matches!(
            courier_status("Lost"),
            Err(CoreError::UnrecognizedStatus { .. })
        ));
    }

    #[test]
    fn test_courier_webhook_pickup() {
        let event = normalize_webhook(
            WebhookSource::Courier,
            &body(json!({
                "orderReference": "ATK-2024-001",
                "awb": "AWB123",
                "currentStatus": "PICKED UP",
                "location": "Guntur",
                "timestamp": "2024-03-02T09:00:00Z"
            })),
            now(),
        )
        .unwrap();

        assert_eq!(event.external_id, "AWB123:picked_up:2024-03-02T09:00:00Z");
        assert_eq!(
            event.kind,
            GatewayEventKind::ShipmentPickedUp {
                tracking_number: "AWB123".to_string(),
                location: Some("Guntur".to_string()),
                description: None,
            }
        );
    }

    #[test]
    fn test_courier_pickup_without_awb_is_malformed() {
        let err = normalize_webhook(
            WebhookSource::Courier,
            &body(json!({
                "orderReference": "ATK-2024-001",
                "currentStatus": "Picked Up",
                "timestamp": "2024-03-02T09:00:00Z"
            })),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedGatewayPayload { .. }));
    }

    #[test]
    fn test_courier_snapshot_is_sorted_and_keyed_like_webhooks() {
        let snapshot: CourierSnapshot = serde_json::from_value(json!({
            "trackingNumber": "AWB123",
            "status": "In Transit",
            "history": [
                { "status": "In Transit", "location": "Hyderabad", "timestamp": "2024-03-02T15:00:00Z" },
                { "status": "Picked Up", "location": "Guntur", "timestamp": "2024-03-02T09:00:00Z" }
            ]
        }))
        .unwrap();

        let events = normalize_courier_snapshot(&snapshot, "ATK-2024-001", now()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].external_id, "AWB123:picked_up:2024-03-02T09:00:00Z");
        assert_eq!(
            events[1].kind.shipment_status(),
            Some(ShipmentStatus::InTransit)
        );
    }

    #[test]
    fn test_payment_snapshot_with_refunds() {
        let snapshot: PaymentSnapshot = serde_json::from_value(json!({
            "orderReference": "ATK-2024-001",
            "status": "refunded",
            "amount": 30000,
            "fee": 590,
            "tax": 106,
            "gatewayReference": "pay_ABC",
            "refunds": [
                { "refundId": "rfnd_2", "amount": 20000, "createdAt": "2024-03-03T10:00:00Z" },
                { "refundId": "rfnd_1", "amount": 10000, "createdAt": "2024-03-02T10:00:00Z" }
            ]
        }))
        .unwrap();

        let events = normalize_payment_snapshot(&snapshot, now()).unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids, ["pay_ABC:captured", "refund:rfnd_1", "refund:rfnd_2"]);
    }

    #[test]
    fn test_pending_payment_snapshot_yields_nothing() {
        let snapshot: PaymentSnapshot = serde_json::from_value(json!({
            "orderReference": "ATK-2024-001",
            "status": "created",
            "amount": 30000
        }))
        .unwrap();
        assert!(normalize_payment_snapshot(&snapshot, now()).unwrap().is_empty());
    }
}
