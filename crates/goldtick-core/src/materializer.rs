//! Golden layer materializer.

use std::time::Duration;

use goldtick_warehouse::Warehouse;
use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;
use crate::writer::on_store;
use crate::UtcDateTime;

/// Default trailing window of the golden layer.
pub const DEFAULT_GOLDEN_WINDOW: Duration = Duration::from_secs(60);

/// Result of one golden layer refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Materialization {
    pub materialized_at: UtcDateTime,
    /// Oldest ingestion time included.
    pub window_start: UtcDateTime,
    pub rows: usize,
}

/// Replaces the golden layer with the raw rows ingested inside a trailing window.
#[derive(Clone)]
pub struct GoldenMaterializer {
    warehouse: Warehouse,
    window: Duration,
}

impl GoldenMaterializer {
    pub fn new(warehouse: Warehouse, window: Duration) -> Self {
        Self { warehouse, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Rebuild the golden layer as of `at`.
    ///
    /// Idempotent for a fixed `at` when the raw layer is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MaterializationUnavailable`]; the golden layer
    /// keeps its previous contents in that case.
    pub async fn materialize(&self, at: UtcDateTime) -> Result<Materialization, PipelineError> {
        let window_start = at.saturating_sub(self.window);
        info!(
            materialized_at = %at,
            window_start = %window_start,
            "starting raw to golden transform"
        );

        let threshold_us = window_start.unix_micros();
        let rows = on_store(&self.warehouse, move |warehouse| {
            warehouse.replace_golden(threshold_us)
        })
        .await
        .map_err(PipelineError::MaterializationUnavailable)?;

        info!(rows, "raw to golden transform finished");
        Ok(Materialization {
            materialized_at: at,
            window_start,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use goldtick_warehouse::ObservationRecord;

    use super::*;

    fn record(symbol: &str, ingested: UtcDateTime) -> ObservationRecord {
        ObservationRecord {
            symbol: symbol.to_string(),
            ts_us: ingested.unix_micros() - 60_000_000,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: Some(1),
            ingestion_time_us: ingested.unix_micros(),
            run_id: "run-1".to_string(),
        }
    }

    #[tokio::test]
    async fn window_start_is_inclusive() {
        let warehouse = Warehouse::open_in_memory().expect("warehouse");
        let at = UtcDateTime::parse("2024-05-01T16:01:00Z").expect("ts");
        let edge = UtcDateTime::parse("2024-05-01T16:00:00Z").expect("ts");
        let stale = UtcDateTime::parse("2024-05-01T15:59:59Z").expect("ts");
        warehouse
            .append_raw(&[record("AAPL", edge), record("MSFT", stale)])
            .expect("seed");

        let materializer = GoldenMaterializer::new(warehouse.clone(), DEFAULT_GOLDEN_WINDOW);
        let result = materializer.materialize(at).await.expect("materialize");

        assert_eq!(result.rows, 1);
        assert_eq!(result.window_start, edge);
        let golden = warehouse.golden_rows().expect("golden");
        assert_eq!(golden[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn repeated_materialization_is_idempotent() {
        let warehouse = Warehouse::open_in_memory().expect("warehouse");
        let at = UtcDateTime::parse("2024-05-01T16:01:00Z").expect("ts");
        warehouse
            .append_raw(&[record("AAPL", at)])
            .expect("seed");

        let materializer = GoldenMaterializer::new(warehouse.clone(), DEFAULT_GOLDEN_WINDOW);
        let first = materializer.materialize(at).await.expect("first");
        let second = materializer.materialize(at).await.expect("second");

        assert_eq!(first, second);
        assert_eq!(warehouse.golden_count().expect("count"), 1);
    }
}
