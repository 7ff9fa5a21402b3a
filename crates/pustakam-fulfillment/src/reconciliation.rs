//! # Reconciliation Job
//!
//! Catches up on webhooks that never arrived and submits queued refunds.
//!
//! ## One Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation Pass                                │
//! │                                                                         │
//! │  1. Stale payments: not COD, pending, unpolled for threshold           │
//! │       └── fetch_payment → normalize_payment_snapshot → replay          │
//! │       └── mark_payment_polled (always)                                 │
//! │                                                                         │
//! │  2. Stale shipments: not terminal, no scan or poll for threshold       │
//! │       └── track_shipment → normalize_courier_snapshot → replay         │
//! │       └── mark_shipment_polled (always)                                │
//! │                                                                         │
//! │  3. Refund outbox: unsubmitted, attempts < max                         │
//! │       └── request_refund → mark_submitted | mark_failed                │
//! │                                                                         │
//! │  replay = FulfillmentService::apply_event(event, Delivery::Poll)       │
//! │           (same lock, same dedup log as webhook push)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure for one order is logged and counted as `errored`; the pass goes
//! on and the order is retried once it is stale again. Every poll moves the
//! order to the back of its queue, so orders the gateway keeps reporting as
//! unchanged never crowd newer ones out of a batch. Only failing to list the
//! stale orders aborts a pass.
//!
//! ## Worker
//! ```text
//! ┌───────────────────────┐   run_now() / shutdown()   ┌──────────────────┐
//! │ ReconciliationHandle  │ ─────────────────────────► │ Reconciliation   │
//! │ (API, admin tooling)  │ ◄───────── report ──────── │ Worker           │
//! └───────────────────────┘                            │  interval.tick() │
//!                                                      └──────────────────┘
//! ```
//! Passes never overlap: timed and on-demand runs go through the same loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use pustakam_core::gateway::{normalize_courier_snapshot, normalize_payment_snapshot};
use pustakam_core::GatewayEvent;

use crate::client::GatewayClient;
use crate::config::ReconciliationSettings;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::service::{Delivery, FulfillmentService};

// =============================================================================
// Report
// =============================================================================

/// Counts from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Orders where at least one polled event was applied.
    pub reconciled: usize,
    /// Orders polled successfully with nothing new.
    pub still_pending: usize,
    /// Orders whose poll or replay failed this pass.
    pub errored: usize,
    pub refunds_submitted: usize,
    pub refunds_failed: usize,
}

impl ReconciliationReport {
    fn tally(&mut self, order_id: &str, result: FulfillmentResult<bool>) {
        match result {
            Ok(true) => self.reconciled += 1,
            Ok(false) => self.still_pending += 1,
            Err(e) => {
                warn!(
                    order_id = %order_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Reconciliation failed for order"
                );
                self.errored += 1;
            }
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Polls the gateway and courier for stale orders.
pub struct Reconciler {
    service: FulfillmentService,
    client: Arc<dyn GatewayClient>,
    settings: ReconciliationSettings,
}

impl Reconciler {
    pub fn new(
        service: FulfillmentService,
        client: Arc<dyn GatewayClient>,
        settings: ReconciliationSettings,
    ) -> Self {
        Reconciler {
            service,
            client,
            settings,
        }
    }

    /// Runs one pass now.
    pub async fn run_reconciliation(&self) -> FulfillmentResult<ReconciliationReport> {
        self.run_reconciliation_at(Utc::now()).await
    }

    /// Runs one pass as of `now`. Staleness cutoffs are measured from it.
    pub async fn run_reconciliation_at(
        &self,
        now: DateTime<Utc>,
    ) -> FulfillmentResult<ReconciliationReport> {
        let db = self.service.database();
        let batch = self.settings.batch_size;
        let mut report = ReconciliationReport::default();

        let payments = db
            .orders()
            .stale_payments(now - self.settings.payment_stale_after(), batch)
            .await?;
        for order_id in &payments {
            let result = self.reconcile_payment(order_id, now).await;
            report.tally(order_id, result);
            if let Err(e) = db.orders().mark_payment_polled(order_id, now).await {
                warn!(order_id = %order_id, error = %e, "Failed to record payment poll");
            }
        }

        let shipments = db
            .orders()
            .stale_shipments(now - self.settings.shipment_stale_after(), batch)
            .await?;
        for order_id in &shipments {
            let result = self.reconcile_shipment(order_id, now).await;
            report.tally(order_id, result);
            if let Err(e) = db.orders().mark_shipment_polled(order_id, now).await {
                warn!(order_id = %order_id, error = %e, "Failed to record shipment poll");
            }
        }

        self.submit_refunds(&mut report, now).await?;

        info!(
            payments = payments.len(),
            shipments = shipments.len(),
            reconciled = report.reconciled,
            still_pending = report.still_pending,
            errored = report.errored,
            refunds_submitted = report.refunds_submitted,
            refunds_failed = report.refunds_failed,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    async fn reconcile_payment(&self, order_id: &str, now: DateTime<Utc>) -> FulfillmentResult<bool> {
        let view = self.service.get_order_status(order_id).await?;
        let snapshot = self
            .client
            .fetch_payment(order_id, view.payment.gateway_reference.as_deref())
            .await?;

        let Some(snapshot) = snapshot else {
            debug!(order_id = %order_id, "Gateway has no payment yet");
            return Ok(false);
        };
        if snapshot.order_reference != order_id {
            return Err(FulfillmentError::InvalidResponse(format!(
                "payment snapshot for {} returned for {}",
                snapshot.order_reference, order_id
            )));
        }

        let events = normalize_payment_snapshot(&snapshot, now)?;
        self.replay(&events, now).await
    }

    async fn reconcile_shipment(&self, order_id: &str, now: DateTime<Utc>) -> FulfillmentResult<bool> {
        let view = self.service.get_order_status(order_id).await?;
        let tracking_number = view
            .shipment
            .as_ref()
            .and_then(|s| s.tracking_number.as_deref());

        let Some(snapshot) = self.client.track_shipment(order_id, tracking_number).await? else {
            debug!(order_id = %order_id, "Courier has no tracking yet");
            return Ok(false);
        };

        let events = normalize_courier_snapshot(&snapshot, order_id, now)?;
        self.replay(&events, now).await
    }

    /// Applies polled events in order. Stops at the first failure.
    async fn replay(&self, events: &[GatewayEvent], now: DateTime<Utc>) -> FulfillmentResult<bool> {
        let mut applied = false;
        for event in events {
            let outcome = self.service.apply_event(event, Delivery::Poll, now).await?;
            applied |= outcome.is_applied();
        }
        Ok(applied)
    }

    async fn submit_refunds(
        &self,
        report: &mut ReconciliationReport,
        now: DateTime<Utc>,
    ) -> FulfillmentResult<()> {
        let refunds = self.service.database().refund_requests();
        let pending = refunds
            .pending(self.settings.refund_max_attempts, self.settings.batch_size)
            .await?;

        for refund in pending {
            match self.client.request_refund(&refund).await {
                Ok(gateway_refund_id) => {
                    // A lost write here means a resubmit under the same
                    // idempotency key next pass.
                    if let Err(e) = refunds
                        .mark_submitted(&refund.request_id, &gateway_refund_id, now)
                        .await
                    {
                        error!(request_id = %refund.request_id, error = %e, "Failed to mark refund submitted");
                        report.refunds_failed += 1;
                        continue;
                    }
                    info!(
                        order_id = %refund.order_id,
                        request_id = %refund.request_id,
                        gateway_refund_id = %gateway_refund_id,
                        amount = %refund.amount,
                        "Refund submitted"
                    );
                    report.refunds_submitted += 1;
                }
                Err(e) => {
                    warn!(request_id = %refund.request_id, error = %e, "Refund submission failed");
                    if let Err(db_err) = refunds
                        .mark_failed(&refund.request_id, &e.to_string(), now)
                        .await
                    {
                        error!(request_id = %refund.request_id, error = %db_err, "Failed to record refund attempt");
                    }
                    report.refunds_failed += 1;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Worker
// =============================================================================

type ReportReply = oneshot::Sender<FulfillmentResult<ReconciliationReport>>;

/// Runs reconciliation on a timer and on request.
pub struct ReconciliationWorker {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    periodic: bool,
    trigger_rx: mpsc::Receiver<ReportReply>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the reconciliation worker.
#[derive(Clone)]
pub struct ReconciliationHandle {
    trigger_tx: mpsc::Sender<ReportReply>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ReconciliationHandle {
    /// Runs a pass as soon as the worker is idle and waits for its report.
    pub async fn run_now(&self) -> FulfillmentResult<ReconciliationReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.trigger_tx
            .send(reply_tx)
            .await
            .map_err(|_| FulfillmentError::ShuttingDown)?;
        reply_rx
            .await
            .map_err(|_| FulfillmentError::ChannelError("Worker dropped the reply".into()))?
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> FulfillmentResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| FulfillmentError::ChannelError("Shutdown channel closed".into()))
    }
}

impl ReconciliationWorker {
    /// Creates a worker and returns a handle. Timed passes run only when
    /// `settings.enabled`.
    pub fn new(reconciler: Arc<Reconciler>, settings: &ReconciliationSettings) -> (Self, ReconciliationHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = ReconciliationWorker {
            reconciler,
            interval: settings.interval(),
            periodic: settings.enabled,
            trigger_rx,
            shutdown_rx,
        };

        (worker, ReconciliationHandle { trigger_tx, shutdown_tx })
    }

    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            periodic = self.periodic,
            "Reconciliation worker starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick(), if self.periodic => {
                    if let Err(e) = self.reconciler.run_reconciliation().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }

                Some(reply) = self.trigger_rx.recv() => {
                    let result = self.reconciler.run_reconciliation().await;
                    if let Err(e) = &result {
                        error!(error = %e, "On-demand reconciliation pass failed");
                    }
                    let _ = reply.send(result);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reconciliation worker shutting down");
                    break;
                }
            }
        }

        info!("Reconciliation worker stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
