//! # Order Aggregate Repository
//!
//! Loads and saves whole order aggregates.
//!
//! ## Write Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  save_with_event(&aggregate, &processed)                               │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── UPDATE orders              (status, totals, reason)              │
//! │   ├── REPLACE order_items        (only differs while pending)          │
//! │   ├── UPDATE payments                                                  │
//! │   ├── INSERT payment_audit       (entries past the stored count)       │
//! │   ├── UPSERT shipments                                                 │
//! │   ├── INSERT tracking_events     (entries past the stored count)       │
//! │   ├── INSERT gateway_events      (dedup record)                        │
//! │   └── INSERT refund_requests     (cancellation outbox)                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Audit and tracking rows are only ever appended; the triggers in the
//! schema reject rewrites.
//!
//! Callers must hold the order's lock between `load` and `save`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::gateway_events::{self, ProcessedEvent};
use crate::repository::refunds::{self, NewRefundRequest};
use pustakam_core::validation::format_order_id;
use pustakam_core::{
    Money, Order, OrderAggregate, OrderItem, OrderStatus, OrderSummary, OrderTotals, Payment,
    PaymentAuditEntry, PaymentMethod, PaymentStatus, Shipment, ShipmentStatus, TrackingEvent,
};

// =============================================================================
// Row Types
// =============================================================================

#[derive(FromRow)]
struct OrderRow {
    order_id: String,
    status: OrderStatus,
    subtotal: i64,
    shipping: i64,
    tax: i64,
    total: i64,
    shipping_address: String,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ItemRow {
    book_id: String,
    title: String,
    author: String,
    quantity: i64,
    unit_price: i64,
}

#[derive(FromRow)]
struct PaymentRow {
    payment_id: String,
    order_id: String,
    status: PaymentStatus,
    method: PaymentMethod,
    amount: i64,
    fee: i64,
    tax: i64,
    net_amount: i64,
    refund_amount: Option<i64>,
    gateway_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AuditRow {
    from_status: PaymentStatus,
    to_status: PaymentStatus,
    cause: String,
    amount: Option<i64>,
    at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ShipmentRow {
    shipment_id: String,
    order_id: String,
    status: ShipmentStatus,
    tracking_number: Option<String>,
    expected_delivery: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    return_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TrackingRow {
    status: ShipmentStatus,
    location: Option<String>,
    timestamp: DateTime<Utc>,
    description: String,
}

#[derive(FromRow)]
struct SummaryRow {
    order_id: String,
    status: OrderStatus,
    total: i64,
    item_count: i64,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    shipment_status: Option<ShipmentStatus>,
    created_at: DateTime<Utc>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order aggregates.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Allocates the next order number for `year`, e.g. `ATK-2024-007`.
    ///
    /// Numbers are never reused; a failed placement leaves a gap.
    pub async fn allocate_order_id(&self, year: i32) -> DbResult<String> {
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (year, last_value) VALUES (?1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        Ok(format_order_id(year, sequence))
    }

    /// Inserts a newly placed aggregate.
    pub async fn insert(&self, aggregate: &OrderAggregate) -> DbResult<()> {
        let order = aggregate.order();
        let payment = aggregate.payment();

        debug!(order_id = %order.order_id, total = %order.totals.total, "Inserting order");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, status, subtotal, shipping, tax, total,
                shipping_address, cancellation_reason, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.status)
        .bind(order.totals.subtotal.paise())
        .bind(order.totals.shipping.paise())
        .bind(order.totals.tax.paise())
        .bind(order.totals.total.paise())
        .bind(serde_json::to_string(&order.shipping_address)?)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, order_id, status, method, amount, fee, tax, net_amount,
                refund_amount, gateway_reference, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&payment.payment_id)
        .bind(&payment.order_id)
        .bind(payment.status)
        .bind(payment.method)
        .bind(payment.amount.paise())
        .bind(payment.fee.paise())
        .bind(payment.tax.paise())
        .bind(payment.net_amount.paise())
        .bind(payment.refund_amount.map(|m| m.paise()))
        .bind(&payment.gateway_reference)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await?;

        write_items(&mut *tx, order).await?;
        append_audit(&mut *tx, payment).await?;
        if let Some(shipment) = aggregate.shipment() {
            write_shipment(&mut *tx, shipment).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Loads an aggregate, or `None` if the order number is unknown.
    ///
    /// Reads run in one transaction so the order, payment and shipment come
    /// from the same snapshot.
    pub async fn load(&self, order_id: &str) -> DbResult<Option<OrderAggregate>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, status, subtotal, shipping, tax, total,
                   shipping_address, cancellation_reason, created_at, updated_at
            FROM orders WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let items = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT book_id, title, author, quantity, unit_price
            FROM order_items WHERE order_id = ?1 ORDER BY position ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|i| OrderItem {
            book_id: i.book_id,
            title: i.title,
            author: i.author,
            quantity: i.quantity,
            unit_price: Money::from_paise(i.unit_price),
        })
        .collect();

        let order = Order {
            order_id: row.order_id,
            status: row.status,
            items,
            totals: OrderTotals {
                subtotal: Money::from_paise(row.subtotal),
                shipping: Money::from_paise(row.shipping),
                tax: Money::from_paise(row.tax),
                total: Money::from_paise(row.total),
            },
            shipping_address: serde_json::from_str(&row.shipping_address)?,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };

        let payment = load_payment(&mut *tx, order_id).await?;
        let shipment = load_shipment(&mut *tx, order_id).await?;
        tx.commit().await?;

        Ok(Some(OrderAggregate::restore(order, payment, shipment)))
    }

    /// Loads an aggregate that must exist.
    pub async fn get(&self, order_id: &str) -> DbResult<OrderAggregate> {
        self.load(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))
    }

    /// Persists an aggregate after a non-gateway change (dispatch, amend).
    pub async fn save(&self, aggregate: &OrderAggregate) -> DbResult<()> {
        self.write(aggregate, None, &[]).await
    }

    /// Persists an aggregate together with the event that changed it.
    pub async fn save_with_event(
        &self,
        aggregate: &OrderAggregate,
        processed: &ProcessedEvent,
    ) -> DbResult<()> {
        self.write(aggregate, Some(processed), &[]).await
    }

    /// Persists a cancelled aggregate together with its refund requests.
    pub async fn save_with_refunds(
        &self,
        aggregate: &OrderAggregate,
        refunds: &[NewRefundRequest],
    ) -> DbResult<()> {
        self.write(aggregate, None, refunds).await
    }

    async fn write(
        &self,
        aggregate: &OrderAggregate,
        processed: Option<&ProcessedEvent>,
        refunds: &[NewRefundRequest],
    ) -> DbResult<()> {
        let order = aggregate.order();
        let payment = aggregate.payment();

        debug!(
            order_id = %order.order_id,
            status = %order.status,
            payment_status = %payment.status,
            "Saving order aggregate"
        );

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?2, subtotal = ?3, shipping = ?4, tax = ?5, total = ?6,
                shipping_address = ?7, cancellation_reason = ?8, updated_at = ?9
            WHERE order_id = ?1
            "#,
        )
        .bind(&order.order_id)
        .bind(order.status)
        .bind(order.totals.subtotal.paise())
        .bind(order.totals.shipping.paise())
        .bind(order.totals.tax.paise())
        .bind(order.totals.total.paise())
        .bind(serde_json::to_string(&order.shipping_address)?)
        .bind(&order.cancellation_reason)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::not_found("Order", &order.order_id));
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
            .bind(&order.order_id)
            .execute(&mut *tx)
            .await?;
        write_items(&mut *tx, order).await?;

        sqlx::query(
            r#"
            UPDATE payments SET
                status = ?2, amount = ?3, fee = ?4, tax = ?5, net_amount = ?6,
                refund_amount = ?7, gateway_reference = ?8, updated_at = ?9
            WHERE payment_id = ?1
            "#,
        )
        .bind(&payment.payment_id)
        .bind(payment.status)
        .bind(payment.amount.paise())
        .bind(payment.fee.paise())
        .bind(payment.tax.paise())
        .bind(payment.net_amount.paise())
        .bind(payment.refund_amount.map(|m| m.paise()))
        .bind(&payment.gateway_reference)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await?;
        append_audit(&mut *tx, payment).await?;

        if let Some(shipment) = aggregate.shipment() {
            write_shipment(&mut *tx, shipment).await?;
        }

        if let Some(processed) = processed {
            gateway_events::record_in(&mut *tx, processed).await?;
        }

        let now = order.updated_at;
        for refund in refunds {
            refunds::insert_in(&mut *tx, refund, now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Order list for the admin console, newest first.
    pub async fn list(&self, status: Option<OrderStatus>, limit: i64) -> DbResult<Vec<OrderSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT o.order_id, o.status, o.total, o.created_at,
                   (SELECT COALESCE(SUM(i.quantity), 0)
                      FROM order_items i WHERE i.order_id = o.order_id) AS item_count,
                   p.status AS payment_status,
                   p.method AS payment_method,
                   s.status AS shipment_status
            FROM orders o
            JOIN payments p ON p.order_id = o.order_id
            LEFT JOIN shipments s ON s.order_id = o.order_id
            WHERE (?1 IS NULL OR o.status = ?1)
            ORDER BY o.created_at DESC, o.order_id DESC
            LIMIT ?2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OrderSummary {
                order_id: r.order_id,
                status: r.status,
                total: Money::from_paise(r.total),
                item_count: r.item_count,
                payment_status: r.payment_status,
                payment_method: r.payment_method,
                shipment_status: r.shipment_status,
                created_at: r.created_at,
            })
            .collect())
    }

    /// Orders whose payment has been pending, and unpolled, since before
    /// `cutoff`. Least recently polled first.
    ///
    /// Cash on delivery is settled at the door and never polled. Bank
    /// transfers confirm through the payment gateway and are.
    pub async fn stale_payments(&self, cutoff: DateTime<Utc>, limit: i64) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT order_id FROM payments
            WHERE status = 'pending'
              AND method != 'cash_on_delivery'
              AND COALESCE(last_polled_at, created_at) < ?1
            ORDER BY COALESCE(last_polled_at, created_at) ASC, order_id ASC
            LIMIT ?2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Orders whose shipment is not terminal and has neither moved nor been
    /// polled since `cutoff`. Least recently touched first.
    pub async fn stale_shipments(&self, cutoff: DateTime<Utc>, limit: i64) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT order_id FROM shipments
            WHERE status NOT IN ('delivered', 'returned', 'cancelled')
              AND MAX(updated_at, COALESCE(last_polled_at, updated_at)) < ?1
            ORDER BY MAX(updated_at, COALESCE(last_polled_at, updated_at)) ASC, order_id ASC
            LIMIT ?2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Records a reconciliation poll of the order's payment.
    ///
    /// Moves the order to the back of the `stale_payments` queue, whatever
    /// the poll's outcome.
    pub async fn mark_payment_polled(&self, order_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE payments SET last_polled_at = ?2 WHERE order_id = ?1")
            .bind(order_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a reconciliation poll of the order's shipment.
    pub async fn mark_shipment_polled(&self, order_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE shipments SET last_polled_at = ?2 WHERE order_id = ?1")
            .bind(order_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Child Rows
// =============================================================================

async fn write_items(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, position, book_id, title, author, quantity, unit_price)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&order.order_id)
        .bind(position as i64)
        .bind(&item.book_id)
        .bind(&item.title)
        .bind(&item.author)
        .bind(item.quantity)
        .bind(item.unit_price.paise())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn append_audit(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_audit WHERE payment_id = ?1")
        .bind(&payment.payment_id)
        .fetch_one(&mut *conn)
        .await?;

    let stored = stored as usize;
    if stored > payment.audit_trail.len() {
        return Err(DbError::Corrupt(format!(
            "payment {} has {} stored audit entries but {} in memory",
            payment.payment_id,
            stored,
            payment.audit_trail.len()
        )));
    }

    for (seq, entry) in payment.audit_trail.iter().enumerate().skip(stored) {
        sqlx::query(
            r#"
            INSERT INTO payment_audit (payment_id, seq, from_status, to_status, cause, amount, at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.payment_id)
        .bind(seq as i64)
        .bind(entry.from_status)
        .bind(entry.to_status)
        .bind(&entry.cause)
        .bind(entry.amount.map(|m| m.paise()))
        .bind(entry.at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_shipment(conn: &mut SqliteConnection, shipment: &Shipment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO shipments (
            shipment_id, order_id, status, tracking_number, expected_delivery,
            delivery_date, return_reason, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT (shipment_id) DO UPDATE SET
            status = excluded.status,
            tracking_number = excluded.tracking_number,
            expected_delivery = excluded.expected_delivery,
            delivery_date = excluded.delivery_date,
            return_reason = excluded.return_reason,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&shipment.shipment_id)
    .bind(&shipment.order_id)
    .bind(shipment.status)
    .bind(&shipment.tracking_number)
    .bind(shipment.expected_delivery)
    .bind(shipment.delivery_date)
    .bind(&shipment.return_reason)
    .bind(shipment.created_at)
    .bind(shipment.updated_at)
    .execute(&mut *conn)
    .await?;

    let stored: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tracking_events WHERE shipment_id = ?1")
            .bind(&shipment.shipment_id)
            .fetch_one(&mut *conn)
            .await?;

    for (seq, event) in shipment
        .tracking_events
        .iter()
        .enumerate()
        .skip(stored as usize)
    {
        sqlx::query(
            r#"
            INSERT INTO tracking_events (shipment_id, seq, status, location, timestamp, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&shipment.shipment_id)
        .bind(seq as i64)
        .bind(event.status)
        .bind(&event.location)
        .bind(event.timestamp)
        .bind(&event.description)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_payment(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Payment> {
    let row = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT payment_id, order_id, status, method, amount, fee, tax, net_amount,
               refund_amount, gateway_reference, created_at, updated_at
        FROM payments WHERE order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::Corrupt(format!("order {} has no payment", order_id)))?;

    let audit_trail = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT from_status, to_status, cause, amount, at
        FROM payment_audit WHERE payment_id = ?1 ORDER BY seq ASC
        "#,
    )
    .bind(&row.payment_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|a| PaymentAuditEntry {
        from_status: a.from_status,
        to_status: a.to_status,
        cause: a.cause,
        amount: a.amount.map(Money::from_paise),
        at: a.at,
    })
    .collect();

    Ok(Payment {
        payment_id: row.payment_id,
        order_id: row.order_id,
        status: row.status,
        method: row.method,
        amount: Money::from_paise(row.amount),
        fee: Money::from_paise(row.fee),
        tax: Money::from_paise(row.tax),
        net_amount: Money::from_paise(row.net_amount),
        refund_amount: row.refund_amount.map(Money::from_paise),
        gateway_reference: row.gateway_reference,
        audit_trail,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn load_shipment(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Shipment>> {
    let row = sqlx::query_as::<_, ShipmentRow>(
        r#"
        SELECT shipment_id, order_id, status, tracking_number, expected_delivery,
               delivery_date, return_reason, created_at, updated_at
        FROM shipments WHERE order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let tracking_events = sqlx::query_as::<_, TrackingRow>(
        r#"
        SELECT status, location, timestamp, description
        FROM tracking_events WHERE shipment_id = ?1 ORDER BY seq ASC
        "#,
    )
    .bind(&row.shipment_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|t| TrackingEvent {
        status: t.status,
        location: t.location,
        timestamp: t.timestamp,
        description: t.description,
    })
    .collect();

    Ok(Some(Shipment {
        shipment_id: row.shipment_id,
        order_id: row.order_id,
        status: row.status,
        tracking_number: row.tracking_number,
        tracking_events,
        expected_delivery: row.expected_delivery,
        delivery_date: row.delivery_date,
        return_reason: row.return_reason,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

// =============================================================================
// Unit Tests
// =============================================================================
