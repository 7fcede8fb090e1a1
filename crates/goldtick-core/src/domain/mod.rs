//! # Domain Models
//!
//! Canonical domain types for the goldtick pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker (`.` rewritten to `-`) |
//! | [`Universe`] | Ordered, unique, non-empty symbol set for one run |
//! | [`IntradaySeries`] | Provider rows for one symbol, timestamps possibly naive |
//! | [`PriceObservation`] | UTC observation stamped with its ingestion time |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`ProviderTimestamp`] | Naive or zoned provider timestamp |

mod observation;
mod symbol;
mod timestamp;

pub use observation::{IntradayRow, IntradaySeries, PriceObservation};
pub use symbol::{Symbol, Universe};
pub use timestamp::{ProviderTimestamp, UtcDateTime};
