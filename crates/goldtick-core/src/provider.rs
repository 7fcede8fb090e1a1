//! Price provider contract and request types.
//!
//! A [`PriceProvider`] answers one intraday request per symbol. Before a fetch
//! pass the fetcher calls [`PriceProvider::prepare`] once; a failure there is
//! a batch-level fault, while a failure of [`PriceProvider::intraday`] only
//! affects the requested symbol.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{IntradaySeries, Symbol};

/// Bar interval requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
}

impl Interval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
        }
    }
}

/// Look-back period requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
}

impl Period {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
        }
    }
}

/// Request payload for one symbol's intraday observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntradayRequest {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
    pub include_prepost: bool,
}

impl IntradayRequest {
    /// One day of one-minute bars including pre/post-market samples.
    pub fn recent_minutes(symbol: Symbol) -> Self {
        Self {
            symbol,
            period: Period::OneDay,
            interval: Interval::OneMinute,
            include_prepost: true,
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    Parse,
    Internal,
}

/// Structured error raised by the catalog source and price providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure is transient in the provider's own judgement.
    ///
    /// Informational only. The fetch step retries every batch-level failure
    /// regardless, and per-symbol failures are never retried within a run.
    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Pull-style time-series provider.
///
/// Implementations must be `Send + Sync`; the fetcher may issue requests for
/// several symbols concurrently.
pub trait PriceProvider: Send + Sync {
    /// Short provider name used in logs.
    fn id(&self) -> &'static str;

    /// Establish whatever session state a fetch pass needs.
    ///
    /// # Errors
    ///
    /// A failure here aborts the attempt for the whole batch.
    fn prepare<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + 'a>>;

    /// Fetch intraday rows for one symbol.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the provider is unreachable, refuses the
    /// symbol, or answers with an unparseable payload.
    fn intraday<'a>(
        &'a self,
        req: IntradayRequest,
    ) -> Pin<Box<dyn Future<Output = Result<IntradaySeries, SourceError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_minutes_request_includes_extended_hours() {
        let request = IntradayRequest::recent_minutes(Symbol::parse("AAPL").expect("symbol"));
        assert_eq!(request.interval.as_str(), "1m");
        assert_eq!(request.period.as_str(), "1d");
        assert!(request.include_prepost);
    }

    #[test]
    fn error_display_includes_code() {
        let error = SourceError::rate_limited("slow down");
        assert_eq!(error.to_string(), "slow down (source.rate_limited)");
        assert!(error.retryable());
        assert!(!SourceError::parse("bad json").retryable());
    }
}
