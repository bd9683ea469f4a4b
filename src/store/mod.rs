//! Durable storage (C4, C5): orders, executions, and the symbol universe,
//! backed by SQLite through `sqlx`.

pub mod orders;
pub mod schema;
pub mod symbols;

pub use orders::{NewOrder, OrderStore};
pub use symbols::{CsvSymbolSource, SymbolRegistry, SymbolSource};
