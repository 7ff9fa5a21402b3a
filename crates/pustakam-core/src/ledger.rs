//! # Payment Ledger
//!
//! The lifecycle of one order's payment, independent of shipment.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Payment Lifecycle                                 │
//! │                                                                         │
//! │              capture                 refund (< remaining)               │
//! │  pending ─────────────► success ─────────────────► partial_refund ──┐   │
//! │     │                      │                         │      ▲       │   │
//! │     │ fail / void          │ refund (== amount)      │      └───────┘   │
//! │     ▼                      ▼                         │  refund (< rem)  │
//! │  failed                 refunded ◄───────────────────┘                  │
//! │  (terminal)             (terminal)     refund (== remaining)            │
//! │                                                                         │
//! │  Anything else → InvalidPaymentTransition                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each operation validates everything before touching the payment, so a
//! rejected event leaves it unchanged. Every status change appends one entry
//! to `audit_trail`; entries are never rewritten.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Payment, PaymentAuditEntry, PaymentMethod, PaymentStatus};

/// Gateway details of a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Captured amount; `None` when the gateway did not report one.
    pub amount: Option<Money>,
    pub fee: Money,
    pub tax: Money,
    pub gateway_reference: Option<String>,
}

impl Payment {
    /// Creates a pending payment for an order.
    pub fn new(
        order_id: impl Into<String>,
        method: PaymentMethod,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Payment {
            payment_id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            status: PaymentStatus::Pending,
            method,
            amount,
            fee: Money::zero(),
            tax: Money::zero(),
            net_amount: Money::zero(),
            refund_amount: None,
            gateway_reference: None,
            audit_trail: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of accepted refunds so far.
    pub fn refunded_total(&self) -> Money {
        self.refund_amount.unwrap_or_default()
    }

    /// How much can still be refunded. Zero unless money was captured.
    pub fn refundable_balance(&self) -> Money {
        if self.status.is_captured() {
            self.amount - self.refunded_total()
        } else {
            Money::zero()
        }
    }

    /// Records a gateway authorization. Status stays `pending`.
    pub fn authorize(&mut self, gateway_reference: Option<&str>, at: DateTime<Utc>) -> CoreResult<()> {
        self.expect_status(&[PaymentStatus::Pending], "authorization")?;
        self.check_reference(gateway_reference)?;

        self.set_reference(gateway_reference);
        self.updated_at = at;
        Ok(())
    }

    /// `pending → success`.
    ///
    /// ## Checks
    /// - Captured amount (if reported) equals `amount`
    /// - `fee + tax <= amount`, so `net_amount` never goes negative
    pub fn capture(&mut self, capture: &Capture, at: DateTime<Utc>) -> CoreResult<()> {
        self.expect_status(&[PaymentStatus::Pending], "capture")?;
        self.check_reference(capture.gateway_reference.as_deref())?;

        if let Some(actual) = capture.amount {
            if actual != self.amount {
                return Err(CoreError::AmountMismatch {
                    expected: self.amount,
                    actual,
                });
            }
        }
        if capture.fee.is_negative() || capture.tax.is_negative() {
            return Err(CoreError::malformed("fee and tax must not be negative"));
        }
        if capture.fee.checked_add(capture.tax).map_or(true, |sum| sum > self.amount) {
            return Err(CoreError::malformed(format!(
                "fee {} plus tax {} exceeds amount {}",
                capture.fee, capture.tax, self.amount
            )));
        }

        self.set_reference(capture.gateway_reference.as_deref());
        self.fee = capture.fee;
        self.tax = capture.tax;
        self.net_amount = self.amount - capture.fee - capture.tax;
        self.transition(PaymentStatus::Success, "captured", None, at);
        Ok(())
    }

    /// `pending → failed` on a gateway decline.
    pub fn fail(
        &mut self,
        reason: &str,
        gateway_reference: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.expect_status(&[PaymentStatus::Pending], "failure")?;
        self.check_reference(gateway_reference)?;

        self.set_reference(gateway_reference);
        self.transition(PaymentStatus::Failed, format!("failed: {}", reason), None, at);
        Ok(())
    }

    /// `pending → failed` because the order was cancelled before payment.
    pub fn void(&mut self, cause: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.expect_status(&[PaymentStatus::Pending], "void")?;
        self.transition(PaymentStatus::Failed, cause, None, at);
        Ok(())
    }

    /// Applies a refund.
    ///
    /// `success`/`partial_refund` → `refunded` when the refund exhausts the
    /// captured amount, otherwise → `partial_refund`. `partial_refund` accepts
    /// further refunds up to the captured amount.
    ///
    /// ## Errors
    /// - `InvalidPaymentTransition` unless money is captured
    /// - `RefundExceedsCapturedAmount` when `amount <= 0` or larger than
    ///   the refundable balance
    pub fn refund(&mut self, amount: Money, cause: &str, at: DateTime<Utc>) -> CoreResult<PaymentStatus> {
        self.expect_status(&[PaymentStatus::Success, PaymentStatus::PartialRefund], "refund")?;

        let refundable = self.refundable_balance();
        if !amount.is_positive() || amount > refundable {
            return Err(CoreError::RefundExceedsCapturedAmount {
                requested: amount,
                refundable,
            });
        }

        let refunded = self.refunded_total() + amount;
        let to = if refunded == self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefund
        };

        self.refund_amount = Some(refunded);
        self.transition(to, cause, Some(amount), at);
        Ok(to)
    }

    /// Changes the amount owed after the order's items were amended.
    ///
    /// Only while pending and before the gateway has seen the payment;
    /// afterwards the gateway holds the old amount.
    pub fn reprice(&mut self, amount: Money, at: DateTime<Utc>) -> CoreResult<()> {
        self.expect_status(&[PaymentStatus::Pending], "reprice")?;
        if self.gateway_reference.is_some() {
            return Err(CoreError::InvalidPaymentTransition {
                from: self.status,
                event: "reprice after authorization".to_string(),
            });
        }
        self.amount = amount;
        self.updated_at = at;
        Ok(())
    }

    fn expect_status(&self, allowed: &[PaymentStatus], event: &str) -> CoreResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CoreError::InvalidPaymentTransition {
                from: self.status,
                event: event.to_string(),
            })
        }
    }

    fn check_reference(&self, received: Option<&str>) -> CoreResult<()> {
        match (self.gateway_reference.as_deref(), received) {
            (Some(existing), Some(received)) if existing != received => {
                Err(CoreError::GatewayReferenceConflict {
                    existing: existing.to_string(),
                    received: received.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn set_reference(&mut self, received: Option<&str>) {
        if self.gateway_reference.is_none() {
            self.gateway_reference = received.map(str::to_string);
        }
    }

    fn transition(
        &mut self,
        to: PaymentStatus,
        cause: impl Into<String>,
        amount: Option<Money>,
        at: DateTime<Utc>,
    ) {
        self.audit_trail.push(PaymentAuditEntry {
            from_status: self.status,
            to_status: to,
            cause: cause.into(),
            amount,
            at,
        });
        self.status = to;
        self.updated_at = at;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
