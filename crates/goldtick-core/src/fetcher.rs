//! Market data fetcher.
//!
//! Two layers: an inner per-symbol outcome that absorbs provider failures, and
//! an outer bounded retry around the whole collection step that only fires on
//! batch faults (the provider session cannot be prepared).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{FetchFailure, PipelineError};
use crate::provider::{IntradayRequest, PriceProvider, SourceError};
use crate::retry::{retry_async, RetryConfig};
use crate::{PriceObservation, Symbol, Universe, UtcDateTime};

/// Result of fetching one symbol.
pub type SymbolOutcome = Result<Vec<PriceObservation>, FetchFailure>;

/// Fetcher tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    /// Observations older than `reference - lookback` are dropped.
    pub lookback: Duration,
    /// Maximum in-flight symbol requests.
    pub concurrency: usize,
    /// Deadline for one symbol request.
    pub symbol_timeout: Duration,
    /// Retry policy for batch faults.
    pub retry: RetryConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(3 * 60 * 60),
            concurrency: 8,
            symbol_timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
        }
    }
}

/// Per-symbol failure as carried in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolFailure {
    pub symbol: Symbol,
    pub reason: String,
}

/// Everything one fetch step produced.
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// Outcome for every symbol of the universe.
    pub outcomes: BTreeMap<Symbol, SymbolOutcome>,
    /// Attempts the outer retry loop needed.
    pub attempts: u32,
}

impl FetchReport {
    /// The aggregated fetch table, ordered by ingestion time.
    pub fn observations(&self) -> Vec<PriceObservation> {
        let mut table: Vec<PriceObservation> = self
            .outcomes
            .values()
            .filter_map(|outcome| outcome.as_ref().ok())
            .flatten()
            .cloned()
            .collect();
        table.sort_by_key(PriceObservation::ingestion_time);
        table
    }

    /// Symbols that fetched successfully with their kept row counts.
    pub fn succeeded(&self) -> Vec<(Symbol, usize)> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, outcome)| {
                outcome.as_ref().ok().map(|rows| (symbol.clone(), rows.len()))
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<SymbolFailure> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, outcome)| {
                outcome.as_ref().err().map(|failure| SymbolFailure {
                    symbol: symbol.clone(),
                    reason: failure.to_string(),
                })
            })
            .collect()
    }
}

/// Pulls recent intraday observations for a universe.
#[derive(Clone)]
pub struct MarketDataFetcher {
    provider: Arc<dyn PriceProvider>,
    clock: Arc<dyn Clock>,
    config: FetcherConfig,
}

impl MarketDataFetcher {
    pub fn new(provider: Arc<dyn PriceProvider>, clock: Arc<dyn Clock>, config: FetcherConfig) -> Self {
        Self {
            provider,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch every symbol of `universe`.
    ///
    /// Observations with `timestamp < reference - lookback` are dropped. Each
    /// kept observation is stamped when its symbol completes, never earlier
    /// than `run_start`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::FetchBatchFailure`] when the provider session
    /// could not be prepared on any attempt.
    pub async fn fetch(
        &self,
        universe: &Universe,
        reference: UtcDateTime,
        run_start: UtcDateTime,
    ) -> Result<FetchReport, PipelineError> {
        let cutoff = reference.saturating_sub(self.config.lookback);

        let retried = retry_async(&self.config.retry, "fetch", move |_attempt| {
            self.fetch_once(universe, cutoff, run_start)
        })
        .await
        .map_err(|exhausted| PipelineError::FetchBatchFailure {
            attempts: exhausted.attempts,
            source: exhausted.last_error,
        })?;

        let report = FetchReport {
            outcomes: retried.value,
            attempts: retried.attempts,
        };
        info!(
            provider = self.provider.id(),
            symbols = universe.len(),
            failed = report.failures().len(),
            attempts = report.attempts,
            "fetch step finished"
        );
        Ok(report)
    }

    async fn fetch_once(
        &self,
        universe: &Universe,
        cutoff: UtcDateTime,
        run_start: UtcDateTime,
    ) -> Result<BTreeMap<Symbol, SymbolOutcome>, SourceError> {
        self.provider.prepare().await?;

        let outcomes = stream::iter(universe.iter().cloned())
            .map(|symbol| async move {
                let outcome = self.fetch_symbol(&symbol, cutoff, run_start).await;
                (symbol, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(outcomes.into_iter().collect())
    }

    async fn fetch_symbol(
        &self,
        symbol: &Symbol,
        cutoff: UtcDateTime,
        run_start: UtcDateTime,
    ) -> SymbolOutcome {
        let request = IntradayRequest::recent_minutes(symbol.clone());
        let timeout = self.config.symbol_timeout;

        let result = match tokio::time::timeout(timeout, self.provider.intraday(request)).await {
            Ok(Ok(series)) => {
                let ingestion_time = self.ingestion_instant(run_start);
                series
                    .rows
                    .iter()
                    .filter(|row| row.timestamp.to_utc() >= cutoff)
                    .map(|row| PriceObservation::from_row(symbol.clone(), row, ingestion_time))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(FetchFailure::from)
            }
            Ok(Err(error)) => Err(FetchFailure::Provider(error)),
            Err(_) => Err(FetchFailure::TimedOut {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match &result {
            Ok(rows) => debug!(symbol = %symbol, rows = rows.len(), "symbol fetched"),
            Err(error) => warn!(symbol = %symbol, %error, "failed to fetch symbol; skipping"),
        }
        result
    }

    fn ingestion_instant(&self, run_start: UtcDateTime) -> UtcDateTime {
        self.clock.now().max(run_start)
    }
}
