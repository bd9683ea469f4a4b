//! DDL for the order-store persistence layout (§6).
//!
//! Executed at startup against the configured `sqlx::SqlitePool`; there is no
//! offline migration tool in this crate, so statements are plain `CREATE TABLE
//! IF NOT EXISTS` and are safe to run every boot.

use crate::error::BrokerError;
use sqlx::SqlitePool;

const SYMBOLS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL UNIQUE,
    last_price TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const ORDERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cl_ord_id TEXT NOT NULL UNIQUE,
    sender_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    order_type TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    limit_price TEXT,
    time_in_force TEXT NOT NULL,
    status TEXT NOT NULL,
    filled_quantity INTEGER NOT NULL,
    remaining_quantity INTEGER NOT NULL,
    reject_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const EXECUTIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER NOT NULL REFERENCES orders(id),
    exec_id TEXT NOT NULL UNIQUE,
    exec_quantity INTEGER NOT NULL,
    exec_price TEXT NOT NULL,
    executed_at TEXT NOT NULL
)";

const ORDERS_SYMBOL_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders(symbol)";
const EXECUTIONS_ORDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_executions_order_id ON executions(order_id)";

/// Creates the `symbols`, `orders`, and `executions` tables if they do not already exist.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), BrokerError> {
    sqlx::query(SYMBOLS_TABLE).execute(pool).await?;
    sqlx::query(ORDERS_TABLE).execute(pool).await?;
    sqlx::query(EXECUTIONS_TABLE).execute(pool).await?;
    sqlx::query(ORDERS_SYMBOL_INDEX).execute(pool).await?;
    sqlx::query(EXECUTIONS_ORDER_INDEX).execute(pool).await?;
    Ok(())
}
