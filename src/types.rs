//! Core domain types (§3): symbols, orders, executions, and the enums that
//! classify them. Orders and executions are flat rows keyed by id; relationships
//! are reconstructed by query rather than mutual owning pointers (§9).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_fix(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Side::Buy),
            "2" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn to_fix(self) -> &'static str {
        match self {
            Side::Buy => "1",
            Side::Sell => "2",
        }
    }
}

/// Order type supported by the lifecycle engine. Stop and stop-limit are
/// recognized on the wire (see [`crate::fix::message::RawOrdType`]) but have
/// no lifecycle semantics — admission rejects them with `unsupported_order_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn to_fix(self) -> &'static str {
        match self {
            OrderType::Market => "1",
            OrderType::Limit => "2",
        }
    }
}

/// Time-in-force: how long an order stays eligible for fills after admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TimeInForce {
    /// Valid for the trading day; no extra constraint beyond normal lifecycle rules.
    Day,
    /// Good-Till-Cancel: rests until explicitly filled or canceled.
    Gtc,
    /// Immediate-or-Cancel: any residual after the next fill attempt is canceled.
    Ioc,
    /// Fill-or-Kill: the next fill attempt must complete the order entirely, or it is rejected.
    Fok,
}

impl TimeInForce {
    pub fn from_fix(code: &str) -> Option<Self> {
        match code {
            "0" => Some(TimeInForce::Day),
            "1" => Some(TimeInForce::Gtc),
            "3" => Some(TimeInForce::Ioc),
            "4" => Some(TimeInForce::Fok),
            _ => None,
        }
    }

    pub fn to_fix(self) -> &'static str {
        match self {
            TimeInForce::Day => "0",
            TimeInForce::Gtc => "1",
            TimeInForce::Ioc => "3",
            TimeInForce::Fok => "4",
        }
    }
}

/// Order lifecycle status (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn to_fix(self) -> &'static str {
        match self {
            OrderStatus::New => "0",
            OrderStatus::PartiallyFilled => "1",
            OrderStatus::Filled => "2",
            OrderStatus::Canceled => "4",
            OrderStatus::Rejected => "8",
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "new" => OrderStatus::New,
            "partially_filled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "canceled" => OrderStatus::Canceled,
            "rejected" => OrderStatus::Rejected,
            other => panic!("unknown order status in store: {other}"),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected)
    }
}

/// Execution report type (outbound, tag 150).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExecType {
    New,
    PartialFill,
    Fill,
    Canceled,
    Rejected,
}

impl ExecType {
    pub fn to_fix(self) -> &'static str {
        match self {
            ExecType::New => "0",
            ExecType::PartialFill => "1",
            ExecType::Fill => "2",
            ExecType::Canceled => "4",
            ExecType::Rejected => "8",
        }
    }
}

/// Tradable symbol: uppercase ticker with a last reference price (§3).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Symbol {
    pub symbol: String,
    pub last_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A single client instruction (§3). Owned exclusively by the order store.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub internal_id: i64,
    pub cl_ord_id: String,
    pub sender_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_quantity: i64,
    pub remaining_quantity: i64,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable fill record owned by exactly one order (§3).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Execution {
    pub exec_id: String,
    pub order_internal_id: i64,
    pub exec_quantity: i64,
    pub exec_price: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Average fill price over a set of executions (invariant 9): zero when none filled yet.
pub fn average_fill_price(executions: &[Execution]) -> Decimal {
    let filled: i64 = executions.iter().map(|e| e.exec_quantity).sum();
    if filled == 0 {
        return Decimal::ZERO;
    }
    let weighted: Decimal = executions
        .iter()
        .map(|e| e.exec_price * Decimal::from(e.exec_quantity))
        .sum();
    weighted / Decimal::from(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_fill_price_is_zero_with_no_executions() {
        assert_eq!(average_fill_price(&[]), Decimal::ZERO);
    }

    #[test]
    fn average_fill_price_is_quantity_weighted() {
        let now = Utc::now();
        let execs = vec![
            Execution {
                exec_id: "e1".into(),
                order_internal_id: 1,
                exec_quantity: 30,
                exec_price: Decimal::from(100),
                executed_at: now,
            },
            Execution {
                exec_id: "e2".into(),
                order_internal_id: 1,
                exec_quantity: 70,
                exec_price: Decimal::from(110),
                executed_at: now,
            },
        ];
        // (30*100 + 70*110) / 100 = (3000 + 7700) / 100 = 107
        assert_eq!(average_fill_price(&execs), Decimal::from(107));
    }
}
