//! Raw store writer.

use goldtick_warehouse::{ObservationRecord, Warehouse, WarehouseError};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::PriceObservation;

/// What a write step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rows", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Empty input; the store was not touched.
    Skipped,
    Inserted(usize),
}

impl WriteOutcome {
    pub const fn inserted(self) -> usize {
        match self {
            Self::Skipped => 0,
            Self::Inserted(rows) => rows,
        }
    }
}

/// Appends fetched observations to the raw layer.
#[derive(Clone)]
pub struct RawStoreWriter {
    warehouse: Warehouse,
}

impl RawStoreWriter {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    /// Append `observations` in one transaction tagged with `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WriteUnavailable`] when the store cannot be
    /// opened or the insert fails; nothing is written in that case.
    pub async fn write(
        &self,
        observations: &[PriceObservation],
        run_id: &str,
    ) -> Result<WriteOutcome, PipelineError> {
        if observations.is_empty() {
            warn!(run_id, "no observations fetched; nothing to push to the raw layer");
            return Ok(WriteOutcome::Skipped);
        }

        let records: Vec<ObservationRecord> = observations
            .iter()
            .map(|observation| observation.to_record(run_id))
            .collect();

        info!(run_id, rows = records.len(), "pushing observations to the raw layer");
        let inserted = on_store(&self.warehouse, move |warehouse| warehouse.append_raw(&records))
            .await
            .map_err(PipelineError::WriteUnavailable)?;
        info!(run_id, rows = inserted, "raw layer write committed");

        Ok(WriteOutcome::Inserted(inserted))
    }
}

/// Run a store operation on the blocking pool with its own warehouse handle.
pub(crate) async fn on_store<T, F>(warehouse: &Warehouse, operation: F) -> Result<T, WarehouseError>
where
    T: Send + 'static,
    F: FnOnce(&Warehouse) -> Result<T, WarehouseError> + Send + 'static,
{
    let warehouse = warehouse.clone();
    tokio::task::spawn_blocking(move || operation(&warehouse))
        .await
        .map_err(|e| WarehouseError::SessionUnavailable(format!("store task failed: {e}")))?
}
