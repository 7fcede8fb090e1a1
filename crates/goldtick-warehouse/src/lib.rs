//! # Goldtick Warehouse
//!
//! DuckDB-backed raw and golden layers for the goldtick pipeline.
//!
//! ## Overview
//!
//! - **Raw layer** (`stocks_raw_layer`): append-only. Every successful fetch
//!   batch lands here in one transaction; rows are never updated or deleted.
//! - **Golden layer** (`stocks_golden_layer`): fully replaced on every
//!   materialization with the raw rows ingested inside a trailing window.
//!
//! Every operation opens its own [`StoreSession`] and releases it before
//! returning, so no connection outlives the step that needed it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use goldtick_warehouse::{ObservationRecord, Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!     let rows = vec![ObservationRecord {
//!         symbol: "AAPL".to_string(),
//!         ts_us: 1_700_000_000_000_000,
//!         open: 189.1,
//!         high: 189.4,
//!         low: 188.9,
//!         close: 189.2,
//!         volume: Some(12_000),
//!         ingestion_time_us: 1_700_000_060_000_000,
//!         run_id: "run-0001".to_string(),
//!     }];
//!     warehouse.append_raw(&rows)?;
//!     let golden = warehouse.replace_golden(1_700_000_000_000_000)?;
//!     println!("golden rows: {golden}");
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `stocks_raw_layer` | Append-only intraday observations |
//! | `stocks_golden_layer` | Freshest window of raw observations |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use ::duckdb::ToSql;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use duckdb::{AccessMode, DuckDbDatabase, StoreSession};

/// Name of the append-only raw table.
pub const RAW_TABLE: &str = "stocks_raw_layer";
/// Name of the fully-replaced golden table.
pub const GOLDEN_TABLE: &str = "stocks_golden_layer";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A session could not be handed out.
    #[error("store session unavailable: {0}")]
    SessionUnavailable(String),
}

/// Location of the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for goldtick data.
    pub goldtick_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let goldtick_home = resolve_goldtick_home();
        let db_path = goldtick_home.join("cache").join("goldtick.duckdb");
        Self {
            goldtick_home,
            db_path,
        }
    }
}

/// One stored price observation. Timestamps are microseconds since the Unix epoch, UTC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    pub symbol: String,
    /// Market timestamp of the observation.
    pub ts_us: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<i64>,
    /// Instant the observation was fetched.
    pub ingestion_time_us: i64,
    /// Pipeline run that fetched the observation.
    pub run_id: String,
}

/// Row count of the golden layer for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolCount {
    pub symbol: String,
    pub rows: i64,
}

/// The raw and golden layer store.
#[derive(Clone)]
pub struct Warehouse {
    database: DuckDbDatabase,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let database = DuckDbDatabase::open(config.db_path)?;
        let warehouse = Self { database };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Open a warehouse backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let warehouse = Self {
            database: DuckDbDatabase::open_in_memory()?,
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let session = self.session(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&session)?;
        Ok(())
    }

    /// Open a scoped session. The session closes when dropped.
    pub fn session(&self, mode: AccessMode) -> Result<StoreSession, WarehouseError> {
        self.database.session(mode)
    }

    /// Path of the database file, `None` when in memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.database.location()
    }

    /// Append observations to the raw layer in a single transaction.
    ///
    /// Either every row is inserted or none is. An empty slice touches nothing
    /// and returns zero.
    ///
    /// # Security
    /// All values are passed as query parameters.
    pub fn append_raw(&self, rows: &[ObservationRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let session = self.session(AccessMode::ReadWrite)?;
        append_raw_with(&session, rows)
    }

    /// Replace the golden layer with every raw row whose `ingestion_time` is at
    /// or after `threshold_us`.
    ///
    /// The delete and the insert run in one transaction; on failure the
    /// previous golden contents are kept.
    pub fn replace_golden(&self, threshold_us: i64) -> Result<usize, WarehouseError> {
        let session = self.session(AccessMode::ReadWrite)?;
        replace_golden_with(&session, threshold_us)
    }

    /// Number of rows in the raw layer.
    pub fn raw_count(&self) -> Result<i64, WarehouseError> {
        self.count(RAW_TABLE)
    }

    /// Number of rows in the golden layer.
    pub fn golden_count(&self) -> Result<i64, WarehouseError> {
        self.count(GOLDEN_TABLE)
    }

    /// All golden rows ordered by ingestion time, symbol and market timestamp.
    pub fn golden_rows(&self) -> Result<Vec<ObservationRecord>, WarehouseError> {
        let session = self.session(AccessMode::ReadOnly)?;
        read_observations(&session, GOLDEN_TABLE)
    }

    /// All raw rows ordered by ingestion time, symbol and market timestamp.
    pub fn raw_rows(&self) -> Result<Vec<ObservationRecord>, WarehouseError> {
        let session = self.session(AccessMode::ReadOnly)?;
        read_observations(&session, RAW_TABLE)
    }

    /// Golden row counts per symbol, ordered by symbol.
    pub fn golden_symbol_counts(&self) -> Result<Vec<SymbolCount>, WarehouseError> {
        let session = self.session(AccessMode::ReadOnly)?;
        let mut statement = session.prepare(
            "SELECT symbol, COUNT(*) FROM stocks_golden_layer GROUP BY symbol ORDER BY symbol",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(SymbolCount {
                symbol: row.get(0)?,
                rows: row.get(1)?,
            })
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    fn count(&self, table: &'static str) -> Result<i64, WarehouseError> {
        let session = self.session(AccessMode::ReadOnly)?;
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count = session.query_row(sql.as_str(), [], |row| row.get(0))?;
        Ok(count)
    }
}

fn append_raw_with(
    connection: &Connection,
    rows: &[ObservationRecord],
) -> Result<usize, WarehouseError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = (|| -> Result<usize, WarehouseError> {
        let mut statement = connection.prepare(
            "INSERT INTO stocks_raw_layer \
             (symbol, ts, open, high, low, close, volume, ingestion_time, run_id) \
             VALUES (?, make_timestamp(?), ?, ?, ?, ?, ?, make_timestamp(?), ?)",
        )?;

        for row in rows {
            let params: [&dyn ToSql; 9] = [
                &row.symbol,
                &row.ts_us,
                &row.open,
                &row.high,
                &row.low,
                &row.close,
                &row.volume,
                &row.ingestion_time_us,
                &row.run_id,
            ];
            statement.execute(params.as_slice())?;
        }

        Ok(rows.len())
    })();

    let inserted = finalize_transaction(connection, result)?;
    debug!(inserted, table = RAW_TABLE, "raw rows appended");
    Ok(inserted)
}

fn replace_golden_with(connection: &Connection, threshold_us: i64) -> Result<usize, WarehouseError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = (|| -> Result<usize, WarehouseError> {
        connection.execute("DELETE FROM stocks_golden_layer", [])?;
        let selected = connection.execute(
            "INSERT INTO stocks_golden_layer \
             (symbol, ts, open, high, low, close, volume, ingestion_time, run_id) \
             SELECT symbol, ts, open, high, low, close, volume, ingestion_time, run_id \
             FROM stocks_raw_layer \
             WHERE ingestion_time >= make_timestamp(?)",
            [threshold_us],
        )?;
        Ok(selected)
    })();

    finalize_transaction(connection, result)
}

fn read_observations(
    connection: &Connection,
    table: &'static str,
) -> Result<Vec<ObservationRecord>, WarehouseError> {
    let sql = format!(
        "SELECT symbol, epoch_us(ts), open, high, low, close, volume, epoch_us(ingestion_time), run_id \
         FROM {table} ORDER BY ingestion_time, symbol, ts"
    );
    let mut statement = connection.prepare(sql.as_str())?;
    let rows = statement.query_map([], |row| {
        Ok(ObservationRecord {
            symbol: row.get(0)?,
            ts_us: row.get(1)?,
            open: row.get(2)?,
            high: row.get(3)?,
            low: row.get(4)?,
            close: row.get(5)?,
            volume: row.get(6)?,
            ingestion_time_us: row.get(7)?,
            run_id: row.get(8)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    debug!(table, rows = records.len(), "observations read");
    Ok(records)
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the goldtick home directory from the environment.
fn resolve_goldtick_home() -> PathBuf {
    if let Some(path) = env::var_os("GOLDTICK_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".goldtick");
    }

    PathBuf::from(".goldtick")
}
