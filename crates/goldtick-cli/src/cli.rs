//! CLI argument definitions for goldtick.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Start the scheduler until Ctrl-C |
//! | `once` | Execute a single pipeline run |
//! | `universe` | Resolve and print the symbol universe |
//! | `golden` | Inspect the golden layer |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | Pipeline TOML file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-json` | `false` | Emit logs as JSON on stderr |
//!
//! # Examples
//!
//! ```bash
//! goldtick run --config pipeline.toml
//! goldtick once --pretty
//! RUST_LOG=goldtick=debug goldtick universe
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Goldtick - periodic intraday market data pipeline
#[derive(Debug, Parser)]
#[command(
    name = "goldtick",
    author,
    version,
    about = "Periodic intraday market data pipeline",
    long_about = "Goldtick resolves a ticker universe from an HTML catalog, pulls recent \
one-minute prices for every symbol, appends them to a DuckDB raw layer and keeps a \
golden layer with the freshest window.\n\
\n\
Use 'goldtick <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Pipeline configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fire the pipeline on its schedule until interrupted.
    ///
    /// Every run outcome is printed as one JSON line.
    Run,

    /// Execute one pipeline run and print its report.
    Once,

    /// Resolve the symbol universe and print it.
    Universe,

    /// Print golden layer row counts, total and per symbol.
    Golden,
}
