use goldtick_warehouse::ObservationRecord;
use serde::Serialize;

use crate::{ProviderTimestamp, Symbol, UtcDateTime, ValidationError};

/// One OHLCV row as returned by a price provider, before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntradayRow {
    pub timestamp: ProviderTimestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

/// Time-indexed table returned by a price provider for one symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntradaySeries {
    pub rows: Vec<IntradayRow>,
}

impl IntradaySeries {
    pub fn new(rows: Vec<IntradayRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Normalized intraday observation stamped with the instant it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceObservation {
    symbol: Symbol,
    timestamp: UtcDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<u64>,
    ingestion_time: UtcDateTime,
}

impl PriceObservation {
    /// Build an observation from a provider row, validating the price fields.
    pub fn from_row(
        symbol: Symbol,
        row: &IntradayRow,
        ingestion_time: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_price("open", row.open)?;
        validate_price("high", row.high)?;
        validate_price("low", row.low)?;
        validate_price("close", row.close)?;
        if row.high < row.low {
            return Err(ValidationError::InvalidPriceRange);
        }

        Ok(Self {
            symbol,
            timestamp: row.timestamp.to_utc(),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            ingestion_time,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn volume(&self) -> Option<u64> {
        self.volume
    }

    pub fn ingestion_time(&self) -> UtcDateTime {
        self.ingestion_time
    }

    /// Storage representation tagged with the run that produced it.
    pub fn to_record(&self, run_id: &str) -> ObservationRecord {
        ObservationRecord {
            symbol: self.symbol.to_string(),
            ts_us: self.timestamp.unix_micros(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.map(|v| i64::try_from(v).unwrap_or(i64::MAX)),
            ingestion_time_us: self.ingestion_time.unix_micros(),
            run_id: run_id.to_owned(),
        }
    }
}

fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row(high: f64, low: f64) -> IntradayRow {
        IntradayRow {
            timestamp: ProviderTimestamp::Zoned(datetime!(2024-05-01 13:31:00 UTC)),
            open: 100.0,
            high,
            low,
            close: 100.5,
            volume: Some(2_500),
        }
    }

    #[test]
    fn to_record_uses_epoch_micros() {
        let symbol = Symbol::parse("AAPL").expect("symbol");
        let ingested = UtcDateTime::parse("2024-05-01T16:00:00Z").expect("ts");
        let observation =
            PriceObservation::from_row(symbol, &row(101.0, 99.0), ingested).expect("valid");

        let record = observation.to_record("run-1");
        assert_eq!(record.symbol, "AAPL");
        assert_eq!(record.ts_us, observation.timestamp().unix_micros());
        assert_eq!(record.ingestion_time_us, ingested.unix_micros());
        assert_eq!(record.volume, Some(2_500));
        assert_eq!(record.run_id, "run-1");
    }

    #[test]
    fn rejects_inverted_range() {
        let symbol = Symbol::parse("AAPL").expect("symbol");
        let err = PriceObservation::from_row(symbol, &row(98.0, 99.0), UtcDateTime::now())
            .expect_err("must fail");
        assert_eq!(err, ValidationError::InvalidPriceRange);
    }

    #[test]
    fn rejects_non_finite_prices() {
        let symbol = Symbol::parse("AAPL").expect("symbol");
        let mut bad = row(101.0, 99.0);
        bad.close = f64::NAN;
        let err = PriceObservation::from_row(symbol, &bad, UtcDateTime::now()).expect_err("nan");
        assert_eq!(err, ValidationError::NonFiniteValue { field: "close" });
    }
}
