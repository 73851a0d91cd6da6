pub mod migrations;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ::duckdb::{params, Connection};
use serde::Serialize;
use thiserror::Error;

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid warehouse location '{0}'")]
    InvalidLocation(String),
}

/// One stored price, keyed by `(exchange, symbol, ts_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub exchange: String,
    pub symbol: String,
    pub ts_ms: i64,
    pub price: f64,
    pub size: f64,
}

/// One stored candle, keyed by `(exchange, symbol, ts_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OhlcvRow {
    pub exchange: String,
    pub symbol: String,
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Single-connection DuckDB store.
///
/// Writes are upserts: storing the same key twice leaves one row holding the
/// latest values.
pub struct Warehouse {
    path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl Warehouse {
    /// Opens `location`, which is a file path, `duckdb://<path>`, or `:memory:`.
    pub fn open(location: &str) -> Result<Self, WarehouseError> {
        let location = location.trim();
        let location = location.strip_prefix("duckdb://").unwrap_or(location);
        if location.is_empty() {
            return Err(WarehouseError::InvalidLocation(location.to_owned()));
        }

        if location == IN_MEMORY {
            return Self::initialize(None, Connection::open_in_memory()?);
        }

        let path = PathBuf::from(location);
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(&path)?;
        Self::initialize(Some(path), connection)
    }

    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        Self::open(IN_MEMORY)
    }

    fn initialize(path: Option<PathBuf>, connection: Connection) -> Result<Self, WarehouseError> {
        migrations::apply_migrations(&connection)?;
        Ok(Self {
            path,
            connection: Mutex::new(connection),
        })
    }

    /// `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn upsert_price(&self, row: &PriceRow) -> Result<(), WarehouseError> {
        self.lock().execute(
            r#"
INSERT INTO prices (exchange, symbol, ts_ms, price, size)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT (exchange, symbol, ts_ms) DO UPDATE SET
    price = excluded.price,
    size = excluded.size
"#,
            params![row.exchange, row.symbol, row.ts_ms, row.price, row.size],
        )?;
        Ok(())
    }

    pub fn upsert_ohlcv(&self, row: &OhlcvRow) -> Result<(), WarehouseError> {
        self.lock().execute(
            r#"
INSERT INTO ohlcv (exchange, symbol, ts_ms, open, high, low, close, volume)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (exchange, symbol, ts_ms) DO UPDATE SET
    open = excluded.open,
    high = excluded.high,
    low = excluded.low,
    close = excluded.close,
    volume = excluded.volume
"#,
            params![
                row.exchange,
                row.symbol,
                row.ts_ms,
                row.open,
                row.high,
                row.low,
                row.close,
                row.volume
            ],
        )?;
        Ok(())
    }

    /// Stored prices for one series, ascending by timestamp.
    pub fn load_prices(&self, exchange: &str, symbol: &str) -> Result<Vec<PriceRow>, WarehouseError> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            "SELECT exchange, symbol, ts_ms, price, size FROM prices \
             WHERE exchange = ? AND symbol = ? ORDER BY ts_ms",
        )?;
        let rows = statement.query_map(params![exchange, symbol], |row| {
            Ok(PriceRow {
                exchange: row.get(0)?,
                symbol: row.get(1)?,
                ts_ms: row.get(2)?,
                price: row.get(3)?,
                size: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Stored candles for one series, ascending by timestamp.
    pub fn load_ohlcv(&self, exchange: &str, symbol: &str) -> Result<Vec<OhlcvRow>, WarehouseError> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            "SELECT exchange, symbol, ts_ms, open, high, low, close, volume FROM ohlcv \
             WHERE exchange = ? AND symbol = ? ORDER BY ts_ms",
        )?;
        let rows = statement.query_map(params![exchange, symbol], |row| {
            Ok(OhlcvRow {
                exchange: row.get(0)?,
                symbol: row.get(1)?,
                ts_ms: row.get(2)?,
                open: row.get(3)?,
                high: row.get(4)?,
                low: row.get(5)?,
                close: row.get(6)?,
                volume: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_prices(&self) -> Result<i64, WarehouseError> {
        Ok(self
            .lock()
            .query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?)
    }

    pub fn count_ohlcv(&self) -> Result<i64, WarehouseError> {
        Ok(self
            .lock()
            .query_row("SELECT COUNT(*) FROM ohlcv", [], |row| row.get(0))?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn price(ts_ms: i64, price: f64) -> PriceRow {
        PriceRow {
            exchange: String::from("binance"),
            symbol: String::from("BTC/USDT"),
            ts_ms,
            price,
            size: 0.5,
        }
    }

    #[test]
    fn opens_file_store_and_records_migrations() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("nested").join("series.duckdb");

        let warehouse = Warehouse::open(db_path.to_str().expect("utf-8 path")).expect("open");
        assert_eq!(warehouse.db_path(), Some(db_path.as_path()));
        assert!(db_path.exists());

        let versions = migrations::applied_versions(&warehouse.lock()).expect("versions");
        assert_eq!(versions, vec!["0001_market_series", "0002_series_indexes"]);
    }

    #[test]
    fn reopening_does_not_reapply_migrations() {
        let temp = tempdir().expect("tempdir");
        let location = format!("duckdb://{}", temp.path().join("series.duckdb").display());

        {
            let warehouse = Warehouse::open(&location).expect("first open");
            warehouse.upsert_price(&price(1_000, 42_000.0)).expect("insert");
        }

        let warehouse = Warehouse::open(&location).expect("second open");
        assert_eq!(warehouse.count_prices().expect("count"), 1);
    }

    #[test]
    fn price_upsert_is_idempotent_per_key() {
        let warehouse = Warehouse::open_in_memory().expect("open");

        warehouse.upsert_price(&price(1_000, 42_000.0)).expect("insert");
        warehouse.upsert_price(&price(1_000, 42_500.0)).expect("upsert");
        warehouse.upsert_price(&price(2_000, 42_600.0)).expect("insert");

        let rows = warehouse.load_prices("binance", "BTC/USDT").expect("load");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, 42_500.0);
        assert_eq!(rows[1].ts_ms, 2_000);
    }

    #[test]
    fn same_timestamp_on_other_exchange_is_a_separate_row() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        warehouse.upsert_price(&price(1_000, 42_000.0)).expect("insert");

        let mut other = price(1_000, 42_010.0);
        other.exchange = String::from("kraken");
        warehouse.upsert_price(&other).expect("insert");

        assert_eq!(warehouse.count_prices().expect("count"), 2);
    }

    #[test]
    fn ohlcv_upsert_replaces_values() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        let mut row = OhlcvRow {
            exchange: String::from("coinbase"),
            symbol: String::from("ETH/USD"),
            ts_ms: 60_000,
            open: 2_000.0,
            high: 2_010.0,
            low: 1_990.0,
            close: 2_005.0,
            volume: 10.0,
        };
        warehouse.upsert_ohlcv(&row).expect("insert");

        row.close = 2_008.0;
        row.volume = 12.0;
        warehouse.upsert_ohlcv(&row).expect("upsert");

        let rows = warehouse.load_ohlcv("coinbase", "ETH/USD").expect("load");
        assert_eq!(rows, vec![row]);
        assert_eq!(warehouse.count_ohlcv().expect("count"), 1);
    }

    #[test]
    fn blank_location_is_rejected() {
        let error = Warehouse::open("  ").err().expect("must fail");
        assert!(matches!(error, WarehouseError::InvalidLocation(_)));
    }
}
