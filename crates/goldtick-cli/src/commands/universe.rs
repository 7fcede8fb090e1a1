use goldtick_core::{PipelineConfig, Symbol, UniverseResolver};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

use super::http_client;

#[derive(Debug, Serialize)]
struct UniverseResponseData<'a> {
    company_count: usize,
    symbol_count: usize,
    symbols: &'a [Symbol],
}

pub async fn run(config: &PipelineConfig) -> Result<Value, CliError> {
    let resolved = config.resolver(http_client()).resolve().await?;
    let universe = match config.max_symbols {
        Some(limit) => resolved.universe.truncated(limit),
        None => resolved.universe,
    };

    Ok(serde_json::to_value(UniverseResponseData {
        company_count: resolved.company_count,
        symbol_count: universe.len(),
        symbols: universe.symbols(),
    })?)
}
