//! # Shipment Tracker
//!
//! Physical fulfilment of one order, fed by courier scans.
//!
//! ## Allowed Moves
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pending ──► picked_up ──► in_transit ──► out_for_delivery ──► delivered│
//! │     │            │  └──────────┴───── forward skips ok ─────────┘       │
//! │     │            │             │                 │                      │
//! │     │            └─────────────┴─────────────────┴──────► returned      │
//! │     └────────────┴──► cancelled                                         │
//! │                                                                         │
//! │  pending → anything but picked_up/cancelled is rejected: the courier    │
//! │  assigns the tracking number at pickup.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Scan timestamps never go backwards (equal is fine)
//! - A repeated non-terminal status appends a scan without a status change
//! - `delivery_date` is written exactly once, on delivery
//! - `tracking_number` is set at pickup and never changes

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{Shipment, ShipmentStatus, TrackingEvent};
use crate::validation::validate_tracking_number;

/// A courier scan about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub status: ShipmentStatus,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// AWB; required when `status` is `picked_up`.
    pub tracking_number: Option<String>,
    /// Why the parcel is going back; used for `returned` and `cancelled`.
    pub reason: Option<String>,
}

impl Scan {
    /// A scan with just a status and time.
    pub fn new(status: ShipmentStatus, timestamp: DateTime<Utc>) -> Self {
        Scan {
            status,
            timestamp,
            location: None,
            description: None,
            tracking_number: None,
            reason: None,
        }
    }
}

/// Result of recording a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
}

impl ScanOutcome {
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}

impl Shipment {
    /// Creates a pending shipment for an order.
    pub fn new(
        order_id: impl Into<String>,
        expected_delivery: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Shipment {
            shipment_id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            status: ShipmentStatus::Pending,
            tracking_number: None,
            tracking_events: Vec::new(),
            expected_delivery,
            delivery_date: None,
            return_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Timestamp of the newest recorded scan.
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.tracking_events.last().map(|e| e.timestamp)
    }

    /// Whether the shipment may move `from → to`. Same-status is not a move.
    pub fn can_transition(from: ShipmentStatus, to: ShipmentStatus) -> bool {
        use ShipmentStatus::*;

        if from.is_terminal() || from == to {
            return false;
        }
        match (from, to) {
            (Pending, PickedUp) | (Pending, Cancelled) | (PickedUp, Cancelled) => true,
            (PickedUp | InTransit | OutForDelivery, Returned) => true,
            (Pending, _) => false,
            (_, Cancelled | Returned) => false,
            (from, to) => match (from.stage(), to.stage()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    /// Records a courier scan.
    ///
    /// Validates everything first; on error the shipment is unchanged.
    ///
    /// ## Errors
    /// - `InvalidShipmentTransition` for a move outside the diagram
    /// - `OutOfOrderShipmentEvent` when the scan predates the last one
    /// - `TrackingNumberConflict` when pickup carries a different AWB
    pub fn record(&mut self, scan: Scan) -> CoreResult<ScanOutcome> {
        let from = self.status;
        let to = scan.status;

        let repeat = from == to && !from.is_terminal();
        if !repeat && !Self::can_transition(from, to) {
            return Err(CoreError::InvalidShipmentTransition { from, to });
        }

        if let Some(last) = self.last_event_at() {
            if scan.timestamp < last {
                return Err(CoreError::OutOfOrderShipmentEvent {
                    last,
                    attempted: scan.timestamp,
                });
            }
        }

        let tracking_number = match scan.tracking_number.as_deref() {
            Some(received) => {
                validate_tracking_number(received)?;
                if let Some(existing) = self.tracking_number.as_deref() {
                    if existing != received {
                        return Err(CoreError::TrackingNumberConflict {
                            existing: existing.to_string(),
                            received: received.to_string(),
                        });
                    }
                }
                Some(received.to_string())
            }
            None => None,
        };
        if to == ShipmentStatus::PickedUp && tracking_number.is_none() && self.tracking_number.is_none() {
            return Err(ValidationError::Required {
                field: "tracking_number".to_string(),
            }
            .into());
        }

        let description = scan
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| default_description(to, scan.reason.as_deref()));

        if self.tracking_number.is_none() {
            self.tracking_number = tracking_number;
        }
        self.tracking_events.push(TrackingEvent {
            status: to,
            location: scan.location,
            timestamp: scan.timestamp,
            description,
        });
        self.status = to;
        self.updated_at = scan.timestamp;

        match to {
            ShipmentStatus::Delivered if self.delivery_date.is_none() => {
                self.delivery_date = Some(scan.timestamp);
            }
            ShipmentStatus::Returned => {
                self.return_reason = Some(
                    scan.reason
                        .unwrap_or_else(|| "returned to origin".to_string()),
                );
            }
            _ => {}
        }

        Ok(ScanOutcome { from, to })
    }

    /// Cancels a shipment that has not left the courier hub.
    ///
    /// `at` is clamped to the last scan so a lagging clock cannot block a
    /// cancellation.
    pub fn cancel(&mut self, reason: &str, at: DateTime<Utc>) -> CoreResult<ScanOutcome> {
        let at = match self.last_event_at() {
            Some(last) if last > at => last,
            _ => at,
        };
        self.record(Scan {
            reason: Some(reason.to_string()),
            ..Scan::new(ShipmentStatus::Cancelled, at)
        })
    }
}

fn default_description(status: ShipmentStatus, reason: Option<&str>) -> String {
    match (status, reason) {
        (ShipmentStatus::Pending, _) => "Awaiting pickup".to_string(),
        (ShipmentStatus::PickedUp, _) => "Picked up by courier".to_string(),
        (ShipmentStatus::InTransit, _) => "In transit".to_string(),
        (ShipmentStatus::OutForDelivery, _) => "Out for delivery".to_string(),
        (ShipmentStatus::Delivered, _) => "Delivered".to_string(),
        (ShipmentStatus::Returned, Some(reason)) => format!("Returned: {}", reason),
        (ShipmentStatus::Returned, None) => "Returned to origin".to_string(),
        (ShipmentStatus::Cancelled, Some(reason)) => format!("Cancelled: {}", reason),
        (ShipmentStatus::Cancelled, None) => "Cancelled".to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
