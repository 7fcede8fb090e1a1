use goldtick_core::{PipelineConfig, SymbolCount};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

use super::open_warehouse;

#[derive(Debug, Serialize)]
struct GoldenResponseData {
    raw_rows: i64,
    golden_rows: i64,
    symbols: Vec<SymbolCount>,
}

pub fn run(config: &PipelineConfig) -> Result<Value, CliError> {
    let warehouse = open_warehouse(config)?;

    Ok(serde_json::to_value(GoldenResponseData {
        raw_rows: warehouse.raw_count()?,
        golden_rows: warehouse.golden_count()?,
        symbols: warehouse.golden_symbol_counts()?,
    })?)
}
