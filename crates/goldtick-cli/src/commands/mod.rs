mod golden;
mod once;
mod run;
mod universe;

use std::io::Write;
use std::sync::Arc;

use goldtick_core::{PipelineConfig, ReqwestHttpClient, Warehouse};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Dispatch `cli` to its command.
///
/// Returns the JSON document to print; streaming commands print as they go
/// and return `None`.
pub async fn run(cli: &Cli) -> Result<Option<Value>, CliError> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Command::Run => run::run(&config).await.map(|()| None),
        Command::Once => once::run(&config).await.map(Some),
        Command::Universe => universe::run(&config).await.map(Some),
        Command::Golden => golden::run(&config).map(Some),
    }
}

pub fn print_json(value: &Value, pretty: bool) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(&mut stdout, value)?;
    } else {
        serde_json::to_writer(&mut stdout, value)?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn http_client() -> Arc<ReqwestHttpClient> {
    Arc::new(ReqwestHttpClient::new())
}

fn open_warehouse(config: &PipelineConfig) -> Result<Warehouse, CliError> {
    Ok(Warehouse::open(config.warehouse_config())?)
}
