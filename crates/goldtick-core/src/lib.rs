//! # Goldtick Core
//!
//! Periodic intraday market data pipeline with a raw and a golden layer.
//!
//! ## Overview
//!
//! A run executes four steps strictly in order:
//!
//! 1. **Universe resolution**: read the `Symbol` column of an HTML catalog.
//! 2. **Fetch**: pull recent one-minute observations per symbol. A failing
//!    symbol is logged and skipped; a batch fault is retried with backoff.
//! 3. **Raw write**: append the fetch table to `stocks_raw_layer`.
//! 4. **Golden materialization**: replace `stocks_golden_layer` with the raw
//!    rows ingested inside a trailing window.
//!
//! The [`Scheduler`] fires runs on a fixed period.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo Finance chart provider |
//! | [`clock`] | Clock abstraction for replayable runs |
//! | [`config`] | TOML pipeline configuration |
//! | [`domain`] | Symbols, universes, observations, timestamps |
//! | [`error`] | Validation and pipeline errors |
//! | [`fetcher`] | Per-symbol fetch with failure isolation |
//! | [`http_client`] | HTTP client abstraction |
//! | [`materializer`] | Raw to golden transform |
//! | [`pipeline`] | Run orchestration and reports |
//! | [`provider`] | Price provider contract |
//! | [`retry`] | Bounded retry with exponential backoff |
//! | [`scheduler`] | Periodic trigger and overlap policy |
//! | [`universe`] | Catalog-based universe resolution |
//! | [`writer`] | Raw layer writer |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use goldtick_core::{PipelineConfig, ReqwestHttpClient, SystemClock, Warehouse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let warehouse = Warehouse::open(config.warehouse_config())?;
//!     let pipeline = config.pipeline(
//!         Arc::new(ReqwestHttpClient::new()),
//!         warehouse,
//!         Arc::new(SystemClock),
//!     );
//!
//!     let report = pipeline.run().await?;
//!     println!("{} observations, {} golden rows", report.num_records, report.golden.rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Scheduler     │  trigger + overlap guard
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ UniverseResolver│────▶│ HTTP Client      │
//! └────────┬────────┘     └──────────────────┘
//!          ▼                        ▲
//! ┌─────────────────┐     ┌─────────┴────────┐
//! │ Fetcher + retry │────▶│ PriceProvider    │
//! └────────┬────────┘     └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ RawStoreWriter  │────▶│ Warehouse        │
//! └────────┬────────┘     │ (DuckDB)         │
//!          ▼              │                  │
//! ┌─────────────────┐     │                  │
//! │ Materializer    │────▶│                  │
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod adapters;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod materializer;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod scheduler;
pub mod universe;
pub mod writer;

// Adapter implementations
pub use adapters::{YahooChartProvider, YahooConfig};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, PipelineConfig, RetrySettings};

// Domain models
pub use domain::{
    IntradayRow, IntradaySeries, PriceObservation, ProviderTimestamp, Symbol, Universe,
    UtcDateTime,
};

pub use error::{FetchFailure, PipelineError, ValidationError};

// Pipeline steps
pub use fetcher::{FetchReport, FetcherConfig, MarketDataFetcher, SymbolFailure, SymbolOutcome};
pub use materializer::{GoldenMaterializer, Materialization, DEFAULT_GOLDEN_WINDOW};
pub use pipeline::{Pipeline, RunContext, RunReport, SymbolRows};
pub use universe::{
    CatalogResolver, ResolvedUniverse, StaticCatalog, UniverseResolver, DEFAULT_CATALOG_URL,
};
pub use writer::{RawStoreWriter, WriteOutcome};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, ScriptedHttpClient};

// Provider contract
pub use provider::{Interval, IntradayRequest, Period, PriceProvider, SourceError, SourceErrorKind};

// Retry logic
pub use retry::{retry_async, Backoff, RetryConfig};

pub use scheduler::{OverlapPolicy, RunGuard, RunOutcome, Scheduler, Trigger, TriggerError};

// Warehouse (re-exported from goldtick-warehouse)
pub use goldtick_warehouse::{ObservationRecord, SymbolCount, Warehouse, WarehouseConfig, WarehouseError};
