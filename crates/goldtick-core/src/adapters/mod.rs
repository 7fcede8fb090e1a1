//! Price provider adapters.

pub mod yahoo;

pub use yahoo::{YahooChartProvider, YahooConfig};
