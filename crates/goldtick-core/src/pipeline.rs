//! One pipeline run: resolve, fetch, write, materialize.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::fetcher::{MarketDataFetcher, SymbolFailure};
use crate::materializer::{GoldenMaterializer, Materialization};
use crate::universe::UniverseResolver;
use crate::writer::{RawStoreWriter, WriteOutcome};
use crate::{Symbol, Universe, UtcDateTime};

/// Per-invocation state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: UtcDateTime,
    /// Attempts the fetch step took; zero until it finishes.
    pub fetch_attempts: u32,
    /// Universe realized for this run; `None` until resolution succeeds.
    pub universe: Option<Universe>,
}

impl RunContext {
    pub fn new(started_at: UtcDateTime) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            fetch_attempts: 0,
            universe: None,
        }
    }
}

/// Rows kept for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRows {
    pub symbol: Symbol,
    pub rows: usize,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub pipeline: String,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    /// Catalog rows read before normalization.
    pub company_count: usize,
    pub universe_size: usize,
    pub fetch_attempts: u32,
    pub succeeded: Vec<SymbolRows>,
    pub failed: Vec<SymbolFailure>,
    /// Size of the fetch table.
    pub num_records: usize,
    pub write: WriteOutcome,
    pub golden: Materialization,
}

/// The dependency-ordered step chain.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    resolver: Arc<dyn UniverseResolver>,
    fetcher: MarketDataFetcher,
    writer: RawStoreWriter,
    materializer: GoldenMaterializer,
    clock: Arc<dyn Clock>,
    max_symbols: Option<usize>,
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<dyn UniverseResolver>,
        fetcher: MarketDataFetcher,
        writer: RawStoreWriter,
        materializer: GoldenMaterializer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            resolver,
            fetcher,
            writer,
            materializer,
            clock,
            max_symbols: None,
        }
    }

    /// Cap the universe to its first `limit` symbols.
    pub fn with_max_symbols(mut self, limit: Option<usize>) -> Self {
        self.max_symbols = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current reading of the pipeline's clock.
    pub fn now(&self) -> UtcDateTime {
        self.clock.now()
    }

    /// Fresh context stamped with the current clock reading.
    pub fn start_run(&self) -> RunContext {
        RunContext::new(self.clock.now())
    }

    /// Execute one run with a fresh context.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let mut context = self.start_run();
        self.execute(&mut context).await
    }

    /// Execute one run in `context`.
    ///
    /// # Errors
    ///
    /// Any step failure aborts the run; later steps do not execute, so a
    /// failed run never touches the golden layer.
    pub async fn execute(&self, context: &mut RunContext) -> Result<RunReport, PipelineError> {
        info!(pipeline = %self.name, run_id = %context.run_id, "pipeline run started");

        let result = self.execute_steps(context).await;
        match &result {
            Ok(report) => info!(
                pipeline = %self.name,
                run_id = %context.run_id,
                num_records = report.num_records,
                golden_rows = report.golden.rows,
                "pipeline run finished"
            ),
            Err(e) => error!(
                pipeline = %self.name,
                run_id = %context.run_id,
                code = e.code(),
                error = %e,
                "pipeline run failed"
            ),
        }
        result
    }

    async fn execute_steps(&self, context: &mut RunContext) -> Result<RunReport, PipelineError> {
        let resolved = self
            .resolver
            .resolve()
            .await
            .map_err(PipelineError::SourceUnavailable)?;
        let company_count = resolved.company_count;
        let universe = match self.max_symbols {
            Some(limit) => resolved.universe.truncated(limit),
            None => resolved.universe,
        };
        context.universe = Some(universe.clone());

        let reference = self.clock.now();
        let fetched = self
            .fetcher
            .fetch(&universe, reference, context.started_at)
            .await?;
        context.fetch_attempts = fetched.attempts;

        let table = fetched.observations();
        let write = self.writer.write(&table, &context.run_id).await?;

        let golden = self.materializer.materialize(self.clock.now()).await?;

        Ok(RunReport {
            run_id: context.run_id.clone(),
            pipeline: self.name.clone(),
            started_at: context.started_at,
            finished_at: self.clock.now(),
            company_count,
            universe_size: universe.len(),
            fetch_attempts: fetched.attempts,
            succeeded: fetched
                .succeeded()
                .into_iter()
                .map(|(symbol, rows)| SymbolRows { symbol, rows })
                .collect(),
            failed: fetched.failures(),
            num_records: table.len(),
            write,
            golden,
        })
    }
}
