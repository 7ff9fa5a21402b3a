//! # Processed Gateway Events
//!
//! Records which external event ids have already been applied, so gateway
//! retries and reconciliation replays are no-ops.
//!
//! The record for an applied event is written by
//! [`OrderRepository::save_with_event`](crate::OrderRepository::save_with_event)
//! in the same transaction as the aggregate, so "applied" and "recorded"
//! cannot diverge.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use pustakam_core::GatewayEvent;

/// One processed external event.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProcessedEvent {
    pub external_id: String,
    pub order_id: String,
    pub kind: String,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// Builds the record for an event that was just applied.
    pub fn from_event(event: &GatewayEvent, processed_at: DateTime<Utc>) -> Self {
        ProcessedEvent {
            external_id: event.external_id.clone(),
            order_id: event.order_reference.clone(),
            kind: event.kind.name().to_string(),
            processed_at,
        }
    }
}

/// Repository for the `gateway_events` table.
#[derive(Debug, Clone)]
pub struct GatewayEventRepository {
    pool: SqlitePool,
}

impl GatewayEventRepository {
    /// Creates a new GatewayEventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GatewayEventRepository { pool }
    }

    /// Whether an external event id was already applied.
    pub async fn is_processed(&self, external_id: &str) -> DbResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM gateway_events WHERE external_id = ?1")
                .bind(external_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Records an event outside an aggregate write.
    ///
    /// Returns `false` if it was already recorded.
    pub async fn record(&self, event: &ProcessedEvent) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        record_in(&mut conn, event).await
    }

    /// Processed events for one order, oldest first.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<ProcessedEvent>> {
        let events = sqlx::query_as::<_, ProcessedEvent>(
            r#"
            SELECT external_id, order_id, kind, processed_at
            FROM gateway_events
            WHERE order_id = ?1
            ORDER BY processed_at ASC, external_id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

/// Inserts a processed-event row on an open connection or transaction.
///
/// `INSERT OR IGNORE`: a second record of the same id is not an error.
pub(crate) async fn record_in(conn: &mut SqliteConnection, event: &ProcessedEvent) -> DbResult<bool> {
    debug!(
        external_id = %event.external_id,
        order_id = %event.order_id,
        kind = %event.kind,
        "Recording processed gateway event"
    );

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO gateway_events (external_id, order_id, kind, processed_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&event.external_id)
    .bind(&event.order_id)
    .bind(&event.kind)
    .bind(event.processed_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
