//! Pipeline configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock S&P 500 pipeline:
//!
//! ```toml
//! pipeline_name = "stocks_etl"
//! catalog_url = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies"
//! schedule = "*/1 * * * *"
//! # allow | skip | serialize
//! overlap = "skip"
//! lookback_secs = 10800
//! golden_window_secs = 60
//! fetch_concurrency = 8
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 200
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use goldtick_warehouse::{Warehouse, WarehouseConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::{YahooChartProvider, YahooConfig};
use crate::clock::Clock;
use crate::fetcher::{FetcherConfig, MarketDataFetcher};
use crate::http_client::HttpClient;
use crate::materializer::GoldenMaterializer;
use crate::pipeline::Pipeline;
use crate::retry::{Backoff, RetryConfig};
use crate::scheduler::{OverlapPolicy, Trigger, TriggerError};
use crate::universe::{CatalogResolver, StaticCatalog, UniverseResolver, DEFAULT_CATALOG_URL};
use crate::writer::RawStoreWriter;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Schedule(#[from] TriggerError),

    #[error("config field '{field}' {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Retry settings for the fetch step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            factor: 2.0,
            max_delay_ms: 3_000,
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            enabled: self.max_retries > 0,
            max_retries: self.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(self.base_delay_ms),
                factor: self.factor,
                max: Duration::from_millis(self.max_delay_ms),
                jitter: self.jitter,
            },
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Also the single-flight key for overlap protection.
    pub pipeline_name: String,
    pub catalog_url: String,
    /// Fixed universe; when set the catalog is not consulted.
    pub symbols: Option<Vec<String>>,
    pub schedule: String,
    /// Overlapping firings are skipped unless configured otherwise.
    pub overlap: OverlapPolicy,
    pub lookback_secs: u64,
    pub golden_window_secs: u64,
    pub fetch_concurrency: usize,
    pub symbol_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub requests_per_second: u32,
    pub max_symbols: Option<usize>,
    pub retry: RetrySettings,
    /// Defaults to `<GOLDTICK_HOME>/cache/goldtick.duckdb`.
    pub db_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: String::from("stocks_etl"),
            catalog_url: String::from(DEFAULT_CATALOG_URL),
            symbols: None,
            schedule: String::from("*/1 * * * *"),
            overlap: OverlapPolicy::Skip,
            lookback_secs: 3 * 60 * 60,
            golden_window_secs: 60,
            fetch_concurrency: 8,
            symbol_timeout_ms: 15_000,
            http_timeout_ms: 10_000,
            requests_per_second: 5,
            max_symbols: None,
            retry: RetrySettings::default(),
            db_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.pipeline_name.trim().is_empty() {
            return invalid("pipeline_name", "must not be empty");
        }
        if self.lookback_secs == 0 {
            return invalid("lookback_secs", "must be greater than zero");
        }
        if self.golden_window_secs == 0 {
            return invalid("golden_window_secs", "must be greater than zero");
        }
        if self.fetch_concurrency == 0 {
            return invalid("fetch_concurrency", "must be greater than zero");
        }
        if self.symbol_timeout_ms == 0 || self.http_timeout_ms == 0 {
            return invalid("timeouts", "must be greater than zero");
        }
        if self.requests_per_second == 0 {
            return invalid("requests_per_second", "must be greater than zero");
        }
        if self.max_symbols == Some(0) {
            return invalid("max_symbols", "must be greater than zero when set");
        }
        if !self.retry.factor.is_finite() || self.retry.factor < 1.0 {
            return invalid("retry.factor", "must be a finite number >= 1");
        }
        if self.symbols.as_ref().is_some_and(Vec::is_empty) {
            return invalid("symbols", "must not be empty when set");
        }
        self.trigger()?;
        Ok(())
    }

    pub fn trigger(&self) -> Result<Trigger, ConfigError> {
        Ok(self.schedule.parse()?)
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        let mut config = WarehouseConfig::default();
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        config
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            lookback: Duration::from_secs(self.lookback_secs),
            concurrency: self.fetch_concurrency,
            symbol_timeout: Duration::from_millis(self.symbol_timeout_ms),
            retry: self.retry.to_retry_config(),
        }
    }

    /// The configured universe source.
    pub fn resolver(&self, http_client: Arc<dyn HttpClient>) -> Arc<dyn UniverseResolver> {
        match &self.symbols {
            Some(symbols) => Arc::new(StaticCatalog::new(symbols.iter().cloned())),
            None => Arc::new(
                CatalogResolver::new(http_client, self.catalog_url.as_str())
                    .with_timeout_ms(self.http_timeout_ms),
            ),
        }
    }

    /// Wire the production pipeline: catalog, Yahoo chart provider and `warehouse`.
    pub fn pipeline(
        &self,
        http_client: Arc<dyn HttpClient>,
        warehouse: Warehouse,
        clock: Arc<dyn Clock>,
    ) -> Pipeline {
        let provider = YahooChartProvider::new(
            http_client.clone(),
            YahooConfig {
                timeout_ms: self.http_timeout_ms,
                requests_per_second: self.requests_per_second,
                ..YahooConfig::default()
            },
        );

        Pipeline::new(
            self.pipeline_name.as_str(),
            self.resolver(http_client),
            MarketDataFetcher::new(Arc::new(provider), clock.clone(), self.fetcher_config()),
            RawStoreWriter::new(warehouse.clone()),
            GoldenMaterializer::new(warehouse, Duration::from_secs(self.golden_window_secs)),
            clock,
        )
        .with_max_symbols(self.max_symbols)
    }
}
