use std::sync::Arc;

use goldtick_core::{PipelineConfig, RunOutcome, Scheduler, SystemClock};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::CliError;

use super::{http_client, open_warehouse, print_json};

pub async fn run(config: &PipelineConfig) -> Result<(), CliError> {
    let trigger = config.trigger()?;
    let warehouse = open_warehouse(config)?;
    let pipeline = config.pipeline(http_client(), warehouse, Arc::new(SystemClock));
    let scheduler = Scheduler::new(pipeline, trigger, config.overlap);

    let (outcomes_tx, mut outcomes_rx) = mpsc::channel::<RunOutcome>(16);
    let printer = tokio::spawn(async move {
        while let Some(outcome) = outcomes_rx.recv().await {
            let printed = serde_json::to_value(&outcome)
                .map_err(CliError::from)
                .and_then(|value| print_json(&value, false));
            if let Err(error) = printed {
                warn!(%error, "failed to print run outcome");
            }
        }
    });

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for Ctrl-C; stopping");
        }
        info!("shutdown requested");
    };
    scheduler.run_until(shutdown, outcomes_tx).await;

    if let Err(error) = printer.await {
        warn!(%error, "outcome printer task failed");
    }
    Ok(())
}
