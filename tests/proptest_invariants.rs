//! Property-based invariant tests over the order lifecycle: quantity
//! conservation, status/quantity equivalence, and exec_id uniqueness,
//! across randomized sequences of partial fills.

use broker_fix::lifecycle::{LifecycleEngine, NoopObserver, SubmitRequest};
use broker_fix::store::{schema, OrderStore, SymbolRegistry};
use broker_fix::types::{OrderStatus, OrderType, Side, TimeInForce};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn build_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

async fn fresh_engine() -> LifecycleEngine {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    schema::ensure_schema(&pool).await.unwrap();
    let orders = OrderStore::new(pool.clone());
    let symbols = SymbolRegistry::new(pool);
    symbols.reload(vec![("AAPL".into(), Decimal::from(150))]).await.unwrap();
    LifecycleEngine::new(orders, symbols, Arc::new(NoopObserver))
}

/// Replays `chunk_sizes` as successive `fill(..., Some(chunk))` calls against a
/// single GTC order of `total_quantity`, capping each request at whatever
/// remains (mirroring what a real caller would see back from the engine).
async fn replay_fills(total_quantity: i64, chunk_sizes: &[i64]) -> broker_fix::types::Order {
    let engine = fresh_engine().await;
    let submitted = engine
        .submit(SubmitRequest {
            cl_ord_id: "P1".into(),
            sender_id: "C1".into(),
            symbol: "AAPL".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: total_quantity,
            limit_price: None,
            time_in_force: TimeInForce::Gtc,
        })
        .await
        .unwrap();

    let mut order = submitted.order;
    for &chunk in chunk_sizes {
        if order.status.is_terminal() {
            break;
        }
        let chunk = chunk.max(1);
        let transitions = engine.fill(order.internal_id, Some(chunk)).await.unwrap();
        order = transitions.last().unwrap().order.clone();
    }
    order
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// For any total quantity and any sequence of positive fill chunks, after
    /// replaying them through the engine: filled + remaining == quantity,
    /// neither side ever goes negative, and the terminal status always
    /// matches the quantity state it implies.
    #[test]
    fn quantity_invariants_hold_after_arbitrary_fill_sequence(
        total_quantity in 1i64..500,
        chunk_sizes in proptest::collection::vec(1i64..200, 1..20),
    ) {
        let runtime = build_runtime();
        let order = runtime.block_on(replay_fills(total_quantity, &chunk_sizes));

        prop_assert_eq!(order.filled_quantity + order.remaining_quantity, order.quantity);
        prop_assert!(order.filled_quantity >= 0);
        prop_assert!(order.remaining_quantity >= 0);
        prop_assert!(order.filled_quantity <= order.quantity);

        match order.status {
            OrderStatus::Filled => prop_assert_eq!(order.remaining_quantity, 0),
            OrderStatus::PartiallyFilled => {
                prop_assert!(order.filled_quantity > 0);
                prop_assert!(order.remaining_quantity > 0);
            }
            OrderStatus::New => prop_assert_eq!(order.filled_quantity, 0),
            other => prop_assert!(false, "unexpected status {other:?} from a fill-only replay"),
        }
    }
}

#[test]
fn deterministic_replay_same_inputs_same_outcome() {
    let runtime = build_runtime();
    let chunks = vec![10, 20, 5, 65];
    let order1 = runtime.block_on(replay_fills(100, &chunks));
    let order2 = runtime.block_on(replay_fills(100, &chunks));

    assert_eq!(order1.status, order2.status);
    assert_eq!(order1.filled_quantity, order2.filled_quantity);
    assert_eq!(order1.remaining_quantity, order2.remaining_quantity);
}

#[tokio::test]
async fn exec_ids_stay_unique_across_many_orders_and_fills() {
    let engine = fresh_engine().await;
    let mut seen = std::collections::HashSet::new();

    for i in 0..25 {
        let submitted = engine
            .submit(SubmitRequest {
                cl_ord_id: format!("U{i}"),
                sender_id: "C1".into(),
                symbol: "AAPL".into(),
                side: Side::Buy,
                order_type: OrderType::Market,
                quantity: 10,
                limit_price: None,
                time_in_force: TimeInForce::Gtc,
            })
            .await
            .unwrap();
        assert!(seen.insert(submitted.exec_id.clone()), "duplicate exec_id on submit ack");

        let fills = engine.fill(submitted.order.internal_id, Some(4)).await.unwrap();
        for t in &fills {
            assert!(seen.insert(t.exec_id.clone()), "duplicate exec_id on fill report");
        }
    }
}

#[tokio::test]
async fn cl_ord_ids_stay_unique_under_repeated_submission_attempts() {
    let engine = fresh_engine().await;
    engine
        .submit(SubmitRequest {
            cl_ord_id: "DUP".into(),
            sender_id: "C1".into(),
            symbol: "AAPL".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: 10,
            limit_price: None,
            time_in_force: TimeInForce::Day,
        })
        .await
        .unwrap();

    for _ in 0..10 {
        let err = engine
            .submit(SubmitRequest {
                cl_ord_id: "DUP".into(),
                sender_id: "C1".into(),
                symbol: "AAPL".into(),
                side: Side::Sell,
                order_type: OrderType::Market,
                quantity: 5,
                limit_price: None,
                time_in_force: TimeInForce::Day,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, broker_fix::error::BrokerError::DuplicateClOrdId(_)));
    }

    assert_eq!(engine.list_orders().await.unwrap().len(), 1);
}
