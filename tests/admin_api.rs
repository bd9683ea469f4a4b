//! Administrative HTTP/JSON surface integration tests: spawn the real axum
//! router on a loopback listener and drive it with `reqwest`, exactly the way
//! the teacher's own REST API tests worked.

use broker_fix::admin::{self, AppState};
use broker_fix::audit::InMemoryAuditSink;
use broker_fix::auth::AuthConfig;
use broker_fix::fix::SessionRegistry;
use broker_fix::lifecycle::{LifecycleEngine, NoopObserver, SubmitRequest};
use broker_fix::router::ExecutionRouter;
use broker_fix::store::{schema, OrderStore, SymbolRegistry};
use broker_fix::types::{OrderType, Side, TimeInForce};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_app() -> (SocketAddr, Arc<LifecycleEngine>, InMemoryAuditSink) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    schema::ensure_schema(&pool).await.unwrap();
    let orders = OrderStore::new(pool.clone());
    let symbols = SymbolRegistry::new(pool);
    symbols.reload(vec![("AAPL".into(), Decimal::from(150))]).await.unwrap();
    let lifecycle = Arc::new(LifecycleEngine::new(orders, symbols.clone(), Arc::new(NoopObserver)));
    let sessions = SessionRegistry::new();
    let router = Arc::new(ExecutionRouter::new(sessions, "BROKER".to_string()));
    let audit = InMemoryAuditSink::new();

    let state = AppState {
        lifecycle: Arc::clone(&lifecycle),
        symbols,
        router,
        audit: Arc::new(audit.clone()),
    };
    let app = admin::create_router(state, AuthConfig::disabled());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (addr, lifecycle, audit)
}

#[tokio::test]
async fn health_returns_ok() {
    let (addr, _lifecycle, _audit) = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn list_orders_reflects_orders_submitted_through_the_lifecycle_engine() {
    let (addr, lifecycle, _audit) = spawn_app().await;
    lifecycle
        .submit(SubmitRequest {
            cl_ord_id: "A1".into(),
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

    let client = reqwest::Client::new();
    let response = client.get(format!("http://{addr}/orders")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let orders: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["cl_ord_id"], "A1");
}

#[tokio::test]
async fn fill_endpoint_fills_an_order_and_records_an_audit_event() {
    let (addr, lifecycle, audit) = spawn_app().await;
    let submitted = lifecycle
        .submit(SubmitRequest {
            cl_ord_id: "A2".into(),
            sender_id: "C1".into(),
            symbol: "AAPL".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: 100,
            limit_price: None,
            time_in_force: TimeInForce::Day,
        })
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/orders/{}/fill", submitted.order.internal_id);
    let response = client.post(&url).json(&serde_json::json!({})).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let order = lifecycle.get_order(submitted.order.internal_id).await.unwrap().unwrap();
    assert_eq!(order.status, broker_fix::types::OrderStatus::Filled);
    assert!(audit.events().iter().any(|e| e.action == "order_fill" && e.outcome == "success"));
}

#[tokio::test]
async fn fill_endpoint_surfaces_lifecycle_errors_as_400() {
    let (addr, lifecycle, _audit) = spawn_app().await;
    let submitted = lifecycle
        .submit(SubmitRequest {
            cl_ord_id: "A3".into(),
            sender_id: "C1".into(),
            symbol: "AAPL".into(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            quantity: 10,
            limit_price: Some(Decimal::from(999)),
            time_in_force: TimeInForce::Gtc,
        })
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/orders/{}/fill", submitted.order.internal_id);
    let response = client.post(&url).json(&serde_json::json!({})).send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn cancel_endpoint_cancels_a_resting_order() {
    let (addr, lifecycle, _audit) = spawn_app().await;
    let submitted = lifecycle
        .submit(SubmitRequest {
            cl_ord_id: "A4".into(),
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

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/orders/{}/cancel", submitted.order.internal_id);
    let response = client.post(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let order = lifecycle.get_order(submitted.order.internal_id).await.unwrap().unwrap();
    assert_eq!(order.status, broker_fix::types::OrderStatus::Canceled);
}

#[tokio::test]
async fn reject_endpoint_rejects_a_new_order_with_a_reason() {
    let (addr, lifecycle, _audit) = spawn_app().await;
    let submitted = lifecycle
        .submit(SubmitRequest {
            cl_ord_id: "A5".into(),
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

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/orders/{}/reject", submitted.order.internal_id);
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "reason": "compliance hold" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let order = lifecycle.get_order(submitted.order.internal_id).await.unwrap().unwrap();
    assert_eq!(order.status, broker_fix::types::OrderStatus::Rejected);
    assert_eq!(order.reject_reason.as_deref(), Some("compliance hold"));
}

#[tokio::test]
async fn symbols_reload_replaces_the_universe_and_is_visible_via_list_symbols() {
    let (addr, _lifecycle, _audit) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/symbols/reload"))
        .json(&serde_json::json!({ "entries": [["TSLA", "700.50"]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["count"], 1);

    let response = client.get(format!("http://{addr}/symbols")).send().await.unwrap();
    let symbols: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0]["symbol"], "TSLA");
}

#[tokio::test]
async fn get_order_returns_404_for_unknown_id() {
    let (addr, _lifecycle, _audit) = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client.get(format!("http://{addr}/orders/999999")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}
