//! # Refund Outbox Repository
//!
//! Refunds requested by cancellations, waiting to be sent to the gateway.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  request_cancellation (per-order lock held)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. UPDATE payments SET status = 'refunded' ...                │   │
//! │  │  2. INSERT INTO payment_audit (...)                            │   │
//! │  │  3. UPDATE shipments SET status = 'cancelled' ...              │   │
//! │  │  4. INSERT INTO refund_requests (...)                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Reconciliation pass                                                   │
//! │  1. SELECT * FROM refund_requests WHERE submitted_at IS NULL           │
//! │  2. For each: POST refund to gateway                                   │
//! │     a. ok   → submitted_at = now, gateway_refund_id = ?,               │
//! │               gateway_events += 'refund:{id}' (so the gateway's own    │
//! │               refund webhook is a duplicate)                           │
//! │     b. fail → attempts += 1, last_error = ?                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The request id doubles as the gateway idempotency key, so a retry after a
//! lost response cannot refund twice.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::gateway_events::{record_in, ProcessedEvent};
use pustakam_core::Money;

/// A refund to queue alongside an aggregate write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefundRequest {
    pub order_id: String,
    pub payment_id: String,
    pub gateway_reference: Option<String>,
    pub amount: Money,
    pub reason: String,
}

/// A queued refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub request_id: String,
    pub order_id: String,
    pub payment_id: String,
    pub gateway_reference: Option<String>,
    pub amount: Money,
    pub reason: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub gateway_refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct RefundRow {
    request_id: String,
    order_id: String,
    payment_id: String,
    gateway_reference: Option<String>,
    amount: i64,
    reason: String,
    attempts: i64,
    last_error: Option<String>,
    gateway_refund_id: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
}

impl From<RefundRow> for RefundRequest {
    fn from(row: RefundRow) -> Self {
        RefundRequest {
            request_id: row.request_id,
            order_id: row.order_id,
            payment_id: row.payment_id,
            gateway_reference: row.gateway_reference,
            amount: Money::from_paise(row.amount),
            reason: row.reason,
            attempts: row.attempts,
            last_error: row.last_error,
            gateway_refund_id: row.gateway_refund_id,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            submitted_at: row.submitted_at,
        }
    }
}

const SELECT_REFUND: &str = r#"
    SELECT request_id, order_id, payment_id, gateway_reference, amount, reason,
           attempts, last_error, gateway_refund_id, created_at, attempted_at, submitted_at
    FROM refund_requests
"#;

/// Repository for refund outbox operations.
#[derive(Debug, Clone)]
pub struct RefundRequestRepository {
    pool: SqlitePool,
}

impl RefundRequestRepository {
    /// Creates a new RefundRequestRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RefundRequestRepository { pool }
    }

    /// Unsubmitted refunds with fewer than `max_attempts` failures, oldest first.
    pub async fn pending(&self, max_attempts: i64, limit: i64) -> DbResult<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>(&format!(
            "{} WHERE submitted_at IS NULL AND attempts < ?1 ORDER BY created_at ASC LIMIT ?2",
            SELECT_REFUND
        ))
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RefundRequest::from).collect())
    }

    /// All refund requests of one order, oldest first.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>(&format!(
            "{} WHERE order_id = ?1 ORDER BY created_at ASC",
            SELECT_REFUND
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RefundRequest::from).collect())
    }

    /// Marks a refund as accepted by the gateway.
    ///
    /// Also records `refund:{gateway_refund_id}` as processed, in the same
    /// transaction, so the gateway's confirmation webhook is a duplicate
    /// rather than a second refund.
    pub async fn mark_submitted(
        &self,
        request_id: &str,
        gateway_refund_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE refund_requests SET
                submitted_at = ?2,
                attempted_at = ?2,
                gateway_refund_id = ?3
            WHERE request_id = ?1
            RETURNING order_id
            "#,
        )
        .bind(request_id)
        .bind(now)
        .bind(gateway_refund_id)
        .fetch_optional(&mut *tx)
        .await?;

        let order_id = order_id.ok_or_else(|| DbError::not_found("RefundRequest", request_id))?;

        record_in(
            &mut *tx,
            &ProcessedEvent {
                external_id: format!("refund:{}", gateway_refund_id),
                order_id,
                kind: "payment_refunded".to_string(),
                processed_at: now,
            },
        )
        .await?;

        tx.commit().await?;

        debug!(request_id = %request_id, gateway_refund_id = %gateway_refund_id, "Refund submitted");
        Ok(())
    }

    /// Records a failed submission attempt.
    pub async fn mark_failed(&self, request_id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        warn!(request_id = %request_id, error = %error, "Refund submission failed");

        sqlx::query(
            r#"
            UPDATE refund_requests SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE request_id = ?1
            "#,
        )
        .bind(request_id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts refunds not yet accepted by the gateway.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM refund_requests WHERE submitted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Queues a refund on an open transaction. Returns the request id.
pub(crate) async fn insert_in(
    conn: &mut SqliteConnection,
    request: &NewRefundRequest,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let request_id = Uuid::new_v4().to_string();

    debug!(
        request_id = %request_id,
        order_id = %request.order_id,
        amount = %request.amount,
        "Queuing refund request"
    );

    sqlx::query(
        r#"
        INSERT INTO refund_requests (
            request_id, order_id, payment_id, gateway_reference, amount, reason,
            attempts, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
        "#,
    )
    .bind(&request_id)
    .bind(&request.order_id)
    .bind(&request.payment_id)
    .bind(&request.gateway_reference)
    .bind(request.amount.paise())
    .bind(&request.reason)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(request_id)
}
