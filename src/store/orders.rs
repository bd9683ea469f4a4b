//! Order store (C4): durable mapping of `cl_ord_id`/internal id to orders and
//! their executions. Every mutation that touches an order and its executions
//! commits atomically in one `sqlx` transaction (§4.4, §5).

use crate::error::BrokerError;
use crate::types::{Execution, Order, OrderStatus, OrderType, Side, TimeInForce};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Fields needed to persist a freshly-admitted order (§4.5 "submit").
pub struct NewOrder {
    pub cl_ord_id: String,
    pub sender_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

#[derive(Clone)]
pub struct OrderStore {
    pool: SqlitePool,
}

fn side_to_db(s: Side) -> &'static str {
    match s {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn side_from_db(s: &str) -> Side {
    match s {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => panic!("unknown side in store: {other}"),
    }
}

fn order_type_to_db(t: OrderType) -> &'static str {
    match t {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
    }
}

fn order_type_from_db(s: &str) -> OrderType {
    match s {
        "market" => OrderType::Market,
        "limit" => OrderType::Limit,
        other => panic!("unknown order type in store: {other}"),
    }
}

fn tif_to_db(t: TimeInForce) -> &'static str {
    match t {
        TimeInForce::Day => "day",
        TimeInForce::Gtc => "gtc",
        TimeInForce::Ioc => "ioc",
        TimeInForce::Fok => "fok",
    }
}

fn tif_from_db(s: &str) -> TimeInForce {
    match s {
        "day" => TimeInForce::Day,
        "gtc" => TimeInForce::Gtc,
        "ioc" => TimeInForce::Ioc,
        "fok" => TimeInForce::Fok,
        other => panic!("unknown time_in_force in store: {other}"),
    }
}

fn order_from_row(row: &sqlx::sqlite::SqliteRow) -> Order {
    let limit_price: Option<String> = row.get("limit_price");
    let reject_reason: Option<String> = row.get("reject_reason");
    Order {
        internal_id: row.get::<i64, _>("id"),
        cl_ord_id: row.get("cl_ord_id"),
        sender_id: row.get("sender_id"),
        symbol: row.get("symbol"),
        side: side_from_db(row.get::<&str, _>("side")),
        order_type: order_type_from_db(row.get::<&str, _>("order_type")),
        quantity: row.get("quantity"),
        limit_price: limit_price.map(|s| Decimal::from_str(&s).expect("stored decimal")),
        time_in_force: tif_from_db(row.get::<&str, _>("time_in_force")),
        status: OrderStatus::from_db_str(row.get::<&str, _>("status")),
        filled_quantity: row.get("filled_quantity"),
        remaining_quantity: row.get("remaining_quantity"),
        reject_reason,
        created_at: DateTime::parse_from_rfc3339(row.get::<&str, _>("created_at"))
            .expect("stored timestamp")
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(row.get::<&str, _>("updated_at"))
            .expect("stored timestamp")
            .with_timezone(&Utc),
    }
}

fn execution_from_row(row: &sqlx::sqlite::SqliteRow) -> Execution {
    Execution {
        exec_id: row.get("exec_id"),
        order_internal_id: row.get("order_id"),
        exec_quantity: row.get("exec_quantity"),
        exec_price: Decimal::from_str(row.get::<&str, _>("exec_price")).expect("stored decimal"),
        executed_at: DateTime::parse_from_rfc3339(row.get::<&str, _>("executed_at"))
            .expect("stored timestamp")
            .with_timezone(&Utc),
    }
}

impl OrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new order with `status=new`, `filled_quantity=0`,
    /// `remaining_quantity=quantity`. Fails with `DuplicateClOrdId` if
    /// `cl_ord_id` already exists — enforced by the table's UNIQUE constraint,
    /// so the check and the insert are the same atomic operation.
    pub async fn insert_new(&self, new_order: NewOrder) -> Result<Order, BrokerError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO orders
                (cl_ord_id, sender_id, symbol, side, order_type, quantity, limit_price,
                 time_in_force, status, filled_quantity, remaining_quantity, reject_reason,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'new', 0, ?, NULL, ?, ?)",
        )
        .bind(&new_order.cl_ord_id)
        .bind(&new_order.sender_id)
        .bind(&new_order.symbol)
        .bind(side_to_db(new_order.side))
        .bind(order_type_to_db(new_order.order_type))
        .bind(new_order.quantity)
        .bind(new_order.limit_price.map(|d| d.to_string()))
        .bind(tif_to_db(new_order.time_in_force))
        .bind(new_order.quantity)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(BrokerError::DuplicateClOrdId(new_order.cl_ord_id));
            }
            Err(e) => return Err(e.into()),
        };

        let id = result.last_insert_rowid();
        self.get_by_internal_id(id)
            .await?
            .ok_or_else(|| BrokerError::WireSchema("order vanished after insert".into()))
    }

    pub async fn get_by_internal_id(&self, id: i64) -> Result<Option<Order>, BrokerError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| order_from_row(&r)))
    }

    pub async fn get_by_cl_ord_id(&self, cl_ord_id: &str) -> Result<Option<Order>, BrokerError> {
        let row = sqlx::query("SELECT * FROM orders WHERE cl_ord_id = ?")
            .bind(cl_ord_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| order_from_row(&r)))
    }

    /// Lists orders in insertion order (§4.4).
    pub async fn list(&self) -> Result<Vec<Order>, BrokerError> {
        let rows = sqlx::query("SELECT * FROM orders ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(order_from_row).collect())
    }

    pub async fn list_executions(&self, order_internal_id: i64) -> Result<Vec<Execution>, BrokerError> {
        let rows = sqlx::query("SELECT * FROM executions WHERE order_id = ? ORDER BY id ASC")
            .bind(order_internal_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(execution_from_row).collect())
    }

    /// Appends one execution and updates the owning order's quantities/status
    /// in a single transaction (invariants §3.1–§3.3). `exec_id` must be
    /// globally unique; collisions are astronomically unlikely for the
    /// random tokens minted by the lifecycle engine, but are still surfaced
    /// as a storage error rather than silently retried.
    ///
    /// When `cancel_residual` is set, the order's IOC residual cancel (§4.5
    /// "IOC completion") is folded into this same transaction: the row is
    /// updated to `fill_status` first, re-read for the fill-report snapshot,
    /// then updated again to `canceled` and re-read for the cancel-report
    /// snapshot, all before the single commit. Both status changes become
    /// visible together or not at all — no reader ever observes the
    /// intermediate `partially_filled` row as a durable state.
    pub async fn append_execution_and_update(
        &self,
        order_internal_id: i64,
        exec_id: &str,
        exec_quantity: i64,
        exec_price: Decimal,
        fill_status: OrderStatus,
        new_filled: i64,
        new_remaining: i64,
        cancel_residual: bool,
    ) -> Result<(Order, Execution, Option<Order>), BrokerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO executions (order_id, exec_id, exec_quantity, exec_price, executed_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_internal_id)
        .bind(exec_id)
        .bind(exec_quantity)
        .bind(exec_price.to_string())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE orders SET status = ?, filled_quantity = ?, remaining_quantity = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(fill_status.as_db_str())
        .bind(new_filled)
        .bind(new_remaining)
        .bind(&now)
        .bind(order_internal_id)
        .execute(&mut *tx)
        .await?;

        let order_row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_internal_id)
            .fetch_one(&mut *tx)
            .await?;
        let exec_row = sqlx::query("SELECT * FROM executions WHERE exec_id = ?")
            .bind(exec_id)
            .fetch_one(&mut *tx)
            .await?;

        let canceled = if cancel_residual {
            let cancel_now = Utc::now().to_rfc3339();
            sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
                .bind(OrderStatus::Canceled.as_db_str())
                .bind(&cancel_now)
                .bind(order_internal_id)
                .execute(&mut *tx)
                .await?;
            let canceled_row = sqlx::query("SELECT * FROM orders WHERE id = ?")
                .bind(order_internal_id)
                .fetch_one(&mut *tx)
                .await?;
            Some(order_from_row(&canceled_row))
        } else {
            None
        };

        tx.commit().await?;
        Ok((order_from_row(&order_row), execution_from_row(&exec_row), canceled))
    }

    /// Updates status only (cancel, reject) — no execution is appended.
    pub async fn update_status(
        &self,
        order_internal_id: i64,
        new_status: OrderStatus,
        reject_reason: Option<&str>,
    ) -> Result<Order, BrokerError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE orders SET status = ?, reject_reason = ?, updated_at = ? WHERE id = ?")
            .bind(new_status.as_db_str())
            .bind(reject_reason)
            .bind(&now)
            .bind(order_internal_id)
            .execute(&self.pool)
            .await?;
        self.get_by_internal_id(order_internal_id)
            .await?
            .ok_or_else(|| BrokerError::WireSchema("order vanished after status update".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> OrderStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::store::schema::ensure_schema(&pool).await.unwrap();
        OrderStore::new(pool)
    }

    fn new_order(cl_ord_id: &str) -> NewOrder {
        NewOrder {
            cl_ord_id: cl_ord_id.to_string(),
            sender_id: "C1".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: 100,
            limit_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    #[tokio::test]
    async fn insert_new_sets_remaining_to_quantity() {
        let store = test_store().await;
        let order = store.insert_new(new_order("O1")).await.unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.filled_quantity, 0);
        assert_eq!(order.remaining_quantity, 100);
    }

    #[tokio::test]
    async fn duplicate_cl_ord_id_is_rejected() {
        let store = test_store().await;
        store.insert_new(new_order("DUP")).await.unwrap();
        let err = store.insert_new(new_order("DUP")).await.unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateClOrdId(_)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_execution_and_update_commits_together() {
        let store = test_store().await;
        let order = store.insert_new(new_order("O2")).await.unwrap();
        let (updated, exec, canceled) = store
            .append_execution_and_update(
                order.internal_id,
                "E1",
                40,
                Decimal::from(150),
                OrderStatus::PartiallyFilled,
                40,
                60,
                false,
            )
            .await
            .unwrap();
        assert_eq!(updated.filled_quantity, 40);
        assert_eq!(updated.remaining_quantity, 60);
        assert_eq!(exec.exec_quantity, 40);
        assert!(canceled.is_none());
        let execs = store.list_executions(order.internal_id).await.unwrap();
        assert_eq!(execs.len(), 1);
    }

    #[tokio::test]
    async fn append_execution_and_update_can_fold_in_residual_cancel() {
        let store = test_store().await;
        let order = store.insert_new(new_order("O3")).await.unwrap();
        let (updated, exec, canceled) = store
            .append_execution_and_update(
                order.internal_id,
                "E2",
                40,
                Decimal::from(150),
                OrderStatus::PartiallyFilled,
                40,
                60,
                true,
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::PartiallyFilled);
        assert_eq!(exec.exec_quantity, 40);
        let canceled = canceled.expect("cancel_residual=true must return a canceled snapshot");
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(canceled.filled_quantity, 40, "cancel must not touch quantities set by the fill");
        assert_eq!(canceled.remaining_quantity, 60);

        let reread = store.get_by_internal_id(order.internal_id).await.unwrap().unwrap();
        assert_eq!(reread.status, OrderStatus::Canceled, "committed row reflects both updates together");
    }
}
