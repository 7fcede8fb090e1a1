use goldtick_warehouse::WarehouseError;
use thiserror::Error;

use crate::provider::SourceError;

/// Validation and contract errors exposed by `goldtick-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("universe must contain at least one symbol")]
    EmptyUniverse,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("timestamp is out of the representable range")]
    TimestampOutOfRange,

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("observation high must be >= low")]
    InvalidPriceRange,
}

/// Why a single symbol produced no observations. Absorbed by the fetcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error(transparent)]
    Provider(#[from] SourceError),
    #[error("symbol fetch timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
    #[error("invalid observation: {0}")]
    InvalidData(#[from] ValidationError),
}

/// Failures that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The catalog could not be retrieved or parsed.
    #[error("symbol catalog unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    /// The whole fetch step faulted on every attempt.
    #[error("fetch step failed after {attempts} attempt(s): {source}")]
    FetchBatchFailure {
        attempts: u32,
        #[source]
        source: SourceError,
    },

    /// The raw store could not be written.
    #[error("raw store write unavailable: {0}")]
    WriteUnavailable(#[source] WarehouseError),

    /// The golden layer could not be recomputed.
    #[error("golden materialization unavailable: {0}")]
    MaterializationUnavailable(#[source] WarehouseError),
}

impl PipelineError {
    /// Stable code used in logs and run reports.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "pipeline.source_unavailable",
            Self::FetchBatchFailure { .. } => "pipeline.fetch_batch_failure",
            Self::WriteUnavailable(_) => "pipeline.write_unavailable",
            Self::MaterializationUnavailable(_) => "pipeline.materialization_unavailable",
        }
    }
}
