//! Lifecycle engine (C6): the order state machine (§4.5).
//!
//! Every admitted action (submit, fill, cancel, reject) commits atomically
//! against the order store and returns the set of `ExecutionReport`-worthy
//! transitions it produced, in emission order. The caller (FIX acceptor or
//! admin surface) hands those transitions to the execution router (C7); the
//! engine itself knows nothing about sessions or the wire.

use crate::error::BrokerError;
use crate::store::{NewOrder, OrderStore, SymbolRegistry};
use crate::types::{Execution, Order, OrderStatus, OrderType, Side, TimeInForce};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Origin of a cancel request, needed to decide whether a failure maps to an
/// `OrderCancelReject` (FIX) or a plain admin error (§4.5, §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOrigin {
    Fix,
    Admin,
}

/// One lifecycle transition worth reporting outward. `avg_px` is recomputed
/// over all executions at the time of the transition (invariant 9). Each
/// transition draws its own fresh `exec_id`, even when it carries no
/// `execution` (an acknowledgement still needs an ExecID for the wire, §4.6).
#[derive(Clone, Debug)]
pub struct Transition {
    pub order: Order,
    pub exec_id: String,
    pub exec_type: crate::types::ExecType,
    pub avg_px: Decimal,
    pub execution: Option<Execution>,
}

/// Observer invoked after every committed transition (§6 "dashboard notification
/// channel"). The engine calls it with the order's `internal_id`; it does not
/// know or care how the observer fans that out.
pub trait OrderChangeObserver: Send + Sync {
    fn on_order_changed(&self, order_internal_id: i64);
}

/// Default observer that does nothing — used when no dashboard is wired up.
pub struct NoopObserver;

impl OrderChangeObserver for NoopObserver {
    fn on_order_changed(&self, _order_internal_id: i64) {}
}

fn mint_exec_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 4] = rng.gen();
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fields needed to admit a NewOrderSingle (§4.5 "submit"). Schema validation
/// (required tags, well-formedness) happens upstream in [`crate::fix::message`];
/// by the time this reaches the engine the fields are well-typed.
pub struct SubmitRequest {
    pub cl_ord_id: String,
    pub sender_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

pub struct LifecycleEngine {
    orders: OrderStore,
    symbols: SymbolRegistry,
    observer: Arc<dyn OrderChangeObserver>,
}

impl LifecycleEngine {
    pub fn new(orders: OrderStore, symbols: SymbolRegistry, observer: Arc<dyn OrderChangeObserver>) -> Self {
        Self { orders, symbols, observer }
    }

    /// Looks up an order by its client-supplied identifier — used to resolve
    /// `OrigClOrdID` on an `OrderCancelRequest` (§4.5).
    pub async fn find_by_cl_ord_id(&self, cl_ord_id: &str) -> Result<Option<Order>, BrokerError> {
        self.orders.get_by_cl_ord_id(cl_ord_id).await
    }

    /// Looks up an order by its internal id (§6 admin surface `get_order`).
    pub async fn get_order(&self, order_internal_id: i64) -> Result<Option<Order>, BrokerError> {
        self.orders.get_by_internal_id(order_internal_id).await
    }

    /// Lists all orders in insertion order (§6 admin surface `list_orders`).
    pub async fn list_orders(&self) -> Result<Vec<Order>, BrokerError> {
        self.orders.list().await
    }

    /// Admits a NewOrderSingle. Stop/stop-limit order types never reach this
    /// call — they are rejected by the caller at message-decode time with
    /// `unsupported_order_type` before an engine call is attempted.
    pub async fn submit(&self, req: SubmitRequest) -> Result<Transition, BrokerError> {
        if let Some(existing) = self.orders.get_by_cl_ord_id(&req.cl_ord_id).await? {
            let _ = existing;
            return Err(BrokerError::DuplicateClOrdId(req.cl_ord_id));
        }

        let order = self
            .orders
            .insert_new(NewOrder {
                cl_ord_id: req.cl_ord_id,
                sender_id: req.sender_id,
                symbol: req.symbol,
                side: req.side,
                order_type: req.order_type,
                quantity: req.quantity,
                limit_price: req.limit_price,
                time_in_force: req.time_in_force,
            })
            .await?;

        self.observer.on_order_changed(order.internal_id);
        Ok(Transition {
            order,
            exec_id: mint_exec_id(),
            exec_type: crate::types::ExecType::New,
            avg_px: Decimal::ZERO,
            execution: None,
        })
    }

    /// Admits an administrative fill (§4.5 "fill"). `requested_qty` is the
    /// caller-supplied quantity cap, if any; the effective fill size is
    /// `min(requested_qty, remaining_quantity)`.
    ///
    /// Returns one transition normally, or two when an IOC fill leaves a
    /// residual: the fill transition first, then the cancel transition —
    /// callers MUST emit both reports in that order (§4.5 "IOC completion").
    pub async fn fill(
        &self,
        order_internal_id: i64,
        requested_qty: Option<i64>,
    ) -> Result<Vec<Transition>, BrokerError> {
        let order = self
            .orders
            .get_by_internal_id(order_internal_id)
            .await?
            .ok_or(BrokerError::IllegalTransition("unknown order".into()))?;

        if !matches!(order.status, OrderStatus::New | OrderStatus::PartiallyFilled) {
            return Err(BrokerError::IllegalTransition("order cannot be executed".into()));
        }

        let symbol = self
            .symbols
            .get(&order.symbol)
            .await?
            .ok_or_else(|| BrokerError::SymbolUnknown(order.symbol.clone()))?;
        let exec_price = symbol.last_price;

        if order.order_type == OrderType::Limit {
            let limit_price = order.limit_price.expect("limit order always carries a price");
            let crosses = match order.side {
                Side::Buy => limit_price >= exec_price,
                Side::Sell => limit_price <= exec_price,
            };
            if !crosses {
                return Err(BrokerError::LimitNotCrossed);
            }
        }

        if let Some(requested) = requested_qty {
            if requested <= 0 {
                return Err(BrokerError::IllegalTransition("fill quantity must be positive".into()));
            }
        }

        let q = requested_qty
            .map(|requested| requested.min(order.remaining_quantity))
            .unwrap_or(order.remaining_quantity);

        if order.time_in_force == TimeInForce::Fok && q != order.remaining_quantity {
            return Err(BrokerError::FokNotFullyFillable);
        }

        let new_filled = order.filled_quantity + q;
        let new_remaining = order.remaining_quantity - q;
        let fill_status = if new_remaining == 0 { OrderStatus::Filled } else { OrderStatus::PartiallyFilled };
        let cancel_residual = order.time_in_force == TimeInForce::Ioc && new_remaining > 0;

        let exec_id = mint_exec_id();
        let (updated, execution, canceled) = self
            .orders
            .append_execution_and_update(
                order_internal_id,
                &exec_id,
                q,
                exec_price,
                fill_status,
                new_filled,
                new_remaining,
                cancel_residual,
            )
            .await?;

        self.observer.on_order_changed(updated.internal_id);

        let executions = self.orders.list_executions(order_internal_id).await?;
        let avg_px = crate::types::average_fill_price(&executions);
        let fill_exec_type = if fill_status == OrderStatus::Filled {
            crate::types::ExecType::Fill
        } else {
            crate::types::ExecType::PartialFill
        };

        let mut transitions = vec![Transition {
            order: updated.clone(),
            exec_id,
            exec_type: fill_exec_type,
            avg_px,
            execution: Some(execution),
        }];

        if let Some(canceled) = canceled {
            self.observer.on_order_changed(canceled.internal_id);
            transitions.push(Transition {
                order: canceled,
                exec_id: mint_exec_id(),
                exec_type: crate::types::ExecType::Canceled,
                avg_px,
                execution: None,
            });
        }

        Ok(transitions)
    }

    /// Admits a cancel, either administrative or FIX-originated (§4.5 "cancel").
    /// On failure, `origin == Fix` callers should map the returned error via
    /// [`BrokerError::cxl_rej_reason`] into an `OrderCancelReject`.
    pub async fn cancel(&self, order_internal_id: i64, origin: CancelOrigin) -> Result<Transition, BrokerError> {
        let order = match self.orders.get_by_internal_id(order_internal_id).await? {
            Some(order) => order,
            None => {
                return Err(match origin {
                    CancelOrigin::Fix => BrokerError::CancelUnknown,
                    CancelOrigin::Admin => BrokerError::IllegalTransition("unknown order".into()),
                });
            }
        };

        if !matches!(order.status, OrderStatus::New | OrderStatus::PartiallyFilled) {
            return Err(match origin {
                CancelOrigin::Fix => BrokerError::CancelTooLate,
                CancelOrigin::Admin => BrokerError::IllegalTransition("order already terminal".into()),
            });
        }

        let updated = self
            .orders
            .update_status(order_internal_id, OrderStatus::Canceled, None)
            .await?;
        self.observer.on_order_changed(updated.internal_id);

        let executions = self.orders.list_executions(order_internal_id).await?;
        let avg_px = crate::types::average_fill_price(&executions);

        Ok(Transition {
            order: updated,
            exec_id: mint_exec_id(),
            exec_type: crate::types::ExecType::Canceled,
            avg_px,
            execution: None,
        })
    }

    /// Admits an administrative reject (§4.5 "reject"). Admissible only from `new`.
    pub async fn reject(&self, order_internal_id: i64, reason: &str) -> Result<Transition, BrokerError> {
        let order = self
            .orders
            .get_by_internal_id(order_internal_id)
            .await?
            .ok_or(BrokerError::IllegalTransition("unknown order".into()))?;

        if order.status != OrderStatus::New {
            return Err(BrokerError::IllegalTransition("only new orders can be rejected".into()));
        }

        let updated = self
            .orders
            .update_status(order_internal_id, OrderStatus::Rejected, Some(reason))
            .await?;
        self.observer.on_order_changed(updated.internal_id);

        Ok(Transition {
            order: updated,
            exec_id: mint_exec_id(),
            exec_type: crate::types::ExecType::Rejected,
            avg_px: Decimal::ZERO,
            execution: None,
        })
    }
}
