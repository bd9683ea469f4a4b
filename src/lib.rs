//! # Simulated Brokerage FIX Service
//!
//! Accepts trading orders over FIX 4.2, persists them, enforces an order
//! lifecycle, and emits execution reports back to connected clients. Three
//! subsystems form the core:
//!
//! - [`fix`] — the wire codec ([`fix::message`]) and session acceptor
//!   ([`fix::acceptor`]): framing, parsing, handshake, per-session outbound
//!   sequencing.
//! - [`lifecycle`] — the order state machine: admission, fills, cancels,
//!   rejects, and the invariants that must hold at every commit.
//! - [`router`] — correlates a committed lifecycle transition with its
//!   originating session and delivers a schema-valid `ExecutionReport`.
//!
//! [`store`] is the durable order/execution/symbol persistence layer behind
//! the lifecycle engine; [`admin`] is the administrative HTTP/JSON surface
//! used to drive fills, cancels, and rejects from outside the FIX wire.
//!
//! ## Example
//!
//! ```rust,no_run
//! use broker_fix::lifecycle::{LifecycleEngine, NoopObserver, SubmitRequest};
//! use broker_fix::store::{OrderStore, SymbolRegistry};
//! use broker_fix::types::{OrderType, Side, TimeInForce};
//! use std::sync::Arc;
//!
//! # async fn run(pool: sqlx::SqlitePool) -> Result<(), broker_fix::error::BrokerError> {
//! let orders = OrderStore::new(pool.clone());
//! let symbols = SymbolRegistry::new(pool);
//! let engine = LifecycleEngine::new(orders, symbols, Arc::new(NoopObserver));
//!
//! let ack = engine
//!     .submit(SubmitRequest {
//!         cl_ord_id: "O1".into(),
//!         sender_id: "C1".into(),
//!         symbol: "AAPL".into(),
//!         side: Side::Buy,
//!         order_type: OrderType::Market,
//!         quantity: 100,
//!         limit_price: None,
//!         time_in_force: TimeInForce::Day,
//!     })
//!     .await?;
//! assert_eq!(ack.order.status, broker_fix::types::OrderStatus::New);
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod fix;
pub mod lifecycle;
pub mod router;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::BrokerError;
pub use lifecycle::LifecycleEngine;
pub use router::ExecutionRouter;
