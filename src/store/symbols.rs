//! Symbol registry (C5): the tradable universe and its last reference prices.
//!
//! `reload` replaces the entire universe atomically — mirroring how the
//! original CSV-driven price updater replaced its in-memory table wholesale
//! rather than patching rows one at a time.

use crate::error::BrokerError;
use crate::types::Symbol;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

#[derive(Clone)]
pub struct SymbolRegistry {
    pool: SqlitePool,
}

impl SymbolRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, symbol: &str) -> Result<Option<Symbol>, BrokerError> {
        let row = sqlx::query("SELECT * FROM symbols WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| symbol_from_row(&r)))
    }

    pub async fn list(&self) -> Result<Vec<Symbol>, BrokerError> {
        let rows = sqlx::query("SELECT * FROM symbols ORDER BY symbol ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(symbol_from_row).collect())
    }

    /// Replaces the whole symbol universe with `entries` in one transaction.
    /// An order admitted mid-reload either sees the old universe or the new
    /// one in full, never a partial mix (§4.6).
    pub async fn reload(&self, entries: Vec<(String, Decimal)>) -> Result<usize, BrokerError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM symbols").execute(&mut *tx).await?;
        let now = Utc::now().to_rfc3339();
        for (symbol, last_price) in &entries {
            sqlx::query(
                "INSERT INTO symbols (symbol, last_price, updated_at) VALUES (?, ?, ?)",
            )
            .bind(symbol.to_uppercase())
            .bind(last_price.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(entries.len())
    }
}

fn symbol_from_row(row: &sqlx::sqlite::SqliteRow) -> Symbol {
    Symbol {
        symbol: row.get("symbol"),
        last_price: Decimal::from_str(row.get::<&str, _>("last_price")).expect("stored decimal"),
        updated_at: chrono::DateTime::parse_from_rfc3339(row.get::<&str, _>("updated_at"))
            .expect("stored timestamp")
            .with_timezone(&Utc),
    }
}

/// Supplies a fresh symbol universe from outside the crate (§C): a CSV file
/// of ticker/price pairs, a market data feed, or a test fixture. Grounded in
/// the original price-updater script, which re-read a CSV on a timer and
/// pushed the whole table, not incremental diffs.
pub trait SymbolSource: Send + Sync {
    fn load(&self) -> Result<Vec<(String, Decimal)>, BrokerError>;
}

/// Reads `symbol,last_price` rows from a CSV file, skipping a header line if
/// the first field is not parseable as a symbol/price pair.
pub struct CsvSymbolSource {
    path: std::path::PathBuf,
}

impl CsvSymbolSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SymbolSource for CsvSymbolSource {
    fn load(&self) -> Result<Vec<(String, Decimal)>, BrokerError> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| BrokerError::WireSchema(format!("reading symbol source: {e}")))?;
        let mut entries = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ',');
            let (Some(symbol), Some(price)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Ok(price) = Decimal::from_str(price.trim()) else {
                continue;
            };
            entries.push((symbol.trim().to_uppercase(), price));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_registry() -> SymbolRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::store::schema::ensure_schema(&pool).await.unwrap();
        SymbolRegistry::new(pool)
    }

    #[tokio::test]
    async fn reload_replaces_the_whole_universe() {
        let registry = test_registry().await;
        registry
            .reload(vec![("AAPL".into(), Decimal::from(150)), ("MSFT".into(), Decimal::from(300))])
            .await
            .unwrap();
        assert_eq!(registry.list().await.unwrap().len(), 2);

        registry.reload(vec![("TSLA".into(), Decimal::from(700))]).await.unwrap();
        let after = registry.list().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].symbol, "TSLA");
    }

    #[test]
    fn csv_source_skips_unparseable_lines() {
        let path = std::env::temp_dir().join(format!("broker_fix_test_symbols_{}", std::process::id()));
        std::fs::write(&path, "symbol,last_price\nAAPL,150.25\nMSFT,300\n\nbad,line,here\n").unwrap();
        let source = CsvSymbolSource::new(&path);
        let entries = source.load().unwrap();
        std::fs::remove_file(&path).ok();
        // the header line fails to parse as a price and is skipped; "bad,line,here" also fails
        assert_eq!(entries, vec![("AAPL".to_string(), Decimal::from_str("150.25").unwrap()), ("MSFT".to_string(), Decimal::from(300))]);
    }
}
