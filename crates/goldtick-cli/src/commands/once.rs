use std::sync::Arc;

use goldtick_core::{PipelineConfig, SystemClock};
use serde_json::Value;

use crate::error::CliError;

use super::{http_client, open_warehouse};

pub async fn run(config: &PipelineConfig) -> Result<Value, CliError> {
    let warehouse = open_warehouse(config)?;
    let pipeline = config.pipeline(http_client(), warehouse, Arc::new(SystemClock));

    let report = pipeline.run().await?;
    Ok(serde_json::to_value(report)?)
}
