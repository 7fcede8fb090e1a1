use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tracing::debug;

use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::provider::{IntradayRequest, PriceProvider, SourceError};
use crate::{IntradayRow, IntradaySeries, ProviderTimestamp};

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_ENDPOINTS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const REFERER: &str = "https://finance.yahoo.com/";

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Settings for the Yahoo chart adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct YahooConfig {
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Upper bound on outbound chart requests per second.
    pub requests_per_second: u32,
    /// How long a crumb stays valid before `prepare` refreshes it.
    pub session_ttl: Duration,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            requests_per_second: 5,
            session_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
struct YahooSession {
    crumb: String,
    refreshed_at: Instant,
}

/// Yahoo Finance v8 chart adapter.
///
/// `prepare` obtains a session cookie and crumb; a failure there is a
/// batch-level fault. Chart requests are rate limited and each carries its own
/// timeout.
#[derive(Clone)]
pub struct YahooChartProvider {
    http_client: Arc<dyn HttpClient>,
    config: YahooConfig,
    session: Arc<Mutex<Option<YahooSession>>>,
    limiter: Arc<DirectRateLimiter>,
}

impl YahooChartProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, config: YahooConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            http_client,
            config,
            session: Arc::new(Mutex::new(None)),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    fn cached_crumb(&self) -> Option<String> {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session
            .as_ref()
            .filter(|s| s.refreshed_at.elapsed() < self.config.session_ttl)
            .map(|s| s.crumb.clone())
    }

    fn store_crumb(&self, crumb: Option<String>) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        *session = crumb.map(|crumb| YahooSession {
            crumb,
            refreshed_at: Instant::now(),
        });
    }

    async fn refresh_session(&self) -> Result<String, SourceError> {
        let cookie_request = HttpRequest::get(COOKIE_URL)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.config.timeout_ms);

        // fc.yahoo.com answers 404 while still setting the session cookie.
        self.http_client.execute(cookie_request).await.map_err(|e| {
            SourceError::unavailable(format!("failed to fetch Yahoo cookie: {}", e.message()))
        })?;

        for endpoint in CRUMB_ENDPOINTS {
            let crumb_request = HttpRequest::get(endpoint)
                .with_header("referer", REFERER)
                .with_timeout_ms(self.config.timeout_ms);

            let Ok(response) = self.http_client.execute(crumb_request).await else {
                continue;
            };
            if response.status == 429 {
                return Err(SourceError::rate_limited(
                    "Yahoo rate limited while fetching crumb",
                ));
            }
            if let Some(crumb) = crumb_from_response(&response) {
                self.store_crumb(Some(crumb.clone()));
                debug!(endpoint, "refreshed Yahoo session crumb");
                return Ok(crumb);
            }
        }

        Err(SourceError::unavailable(
            "failed to fetch Yahoo crumb from all endpoints",
        ))
    }

    fn chart_url(&self, req: &IntradayRequest, crumb: &str) -> String {
        format!(
            "{CHART_BASE_URL}/{}?range={}&interval={}&includePrePost={}&crumb={}",
            urlencoding::encode(req.symbol.as_str()),
            req.period.as_str(),
            req.interval.as_str(),
            req.include_prepost,
            urlencoding::encode(crumb)
        )
    }

    async fn fetch_chart(&self, url: &str) -> Result<HttpResponse, SourceError> {
        self.limiter.until_ready().await;

        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.config.timeout_ms);

        self.http_client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                SourceError::unavailable(format!("yahoo chart timed out: {}", e.message()))
            } else {
                SourceError::unavailable(format!("yahoo transport error: {}", e.message()))
            }
        })
    }
}

impl PriceProvider for YahooChartProvider {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    fn prepare<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.cached_crumb().is_some() {
                return Ok(());
            }
            self.refresh_session().await.map(|_| ())
        })
    }

    fn intraday<'a>(
        &'a self,
        req: IntradayRequest,
    ) -> Pin<Box<dyn Future<Output = Result<IntradaySeries, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let crumb = match self.cached_crumb() {
                Some(crumb) => crumb,
                None => self.refresh_session().await?,
            };

            let mut response = self.fetch_chart(&self.chart_url(&req, &crumb)).await?;

            // Stale crumb: refresh once and retry the same symbol.
            if response.status == 401 || response.status == 429 {
                self.store_crumb(None);
                let crumb = self.refresh_session().await?;
                response = self.fetch_chart(&self.chart_url(&req, &crumb)).await?;
            }

            if response.status == 429 {
                return Err(SourceError::rate_limited(format!(
                    "yahoo rate limited chart for {}",
                    req.symbol
                )));
            }
            if !response.is_success() {
                return Err(SourceError::unavailable(format!(
                    "yahoo returned status {} for {}",
                    response.status, req.symbol
                )));
            }

            parse_chart(&response.body)
        })
    }
}

fn crumb_from_response(response: &HttpResponse) -> Option<String> {
    if !response.is_success() {
        return None;
    }
    let body = response.body.trim();
    let looks_like_html = body.contains("<html") || body.contains("<!DOCTYPE");
    let plausible = !body.is_empty() && body.len() < 100 && !body.contains(' ');
    (plausible && !looks_like_html).then(|| body.to_string())
}

/// Parse a v8 chart payload into provider rows.
///
/// Rows missing any of open/high/low/close are dropped; Yahoo emits such gaps
/// for minutes without trades.
pub(crate) fn parse_chart(body: &str) -> Result<IntradaySeries, SourceError> {
    let chart_response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::parse(format!("failed to parse yahoo chart: {}", e)))?;

    if let Some(error) = chart_response.chart.error {
        return Err(SourceError::invalid_request(format!(
            "yahoo chart API error: {}",
            error.description.or(error.code).unwrap_or_default()
        )));
    }

    let Some(result) = chart_response.chart.result.into_iter().flatten().next() else {
        return Err(SourceError::parse("no chart data in response"));
    };

    // Symbols with no trades in range come back without timestamps.
    let Some(timestamps) = result.timestamp else {
        return Ok(IntradaySeries::default());
    };
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::parse("no quote data"))?;

    let mut rows = Vec::with_capacity(timestamps.len());
    for (i, &ts_value) in timestamps.iter().enumerate() {
        let timestamp = time::OffsetDateTime::from_unix_timestamp(ts_value)
            .map_err(|e| SourceError::parse(format!("invalid timestamp: {}", e)))?;

        if let (Some(Some(open)), Some(Some(high)), Some(Some(low)), Some(Some(close))) = (
            quote.open.get(i),
            quote.high.get(i),
            quote.low.get(i),
            quote.close.get(i),
        ) {
            let volume = quote
                .volume
                .get(i)
                .copied()
                .flatten()
                .and_then(|v| u64::try_from(v).ok());

            rows.push(IntradayRow {
                timestamp: ProviderTimestamp::Zoned(timestamp),
                open: *open,
                high: *high,
                low: *low,
                close: *close,
                volume,
            });
        }
    }

    Ok(IntradaySeries::new(rows))
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartIndicators {
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;
    use crate::provider::SourceErrorKind;
    use crate::Symbol;

    const CHART: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"AAPL","gmtoffset":-14400},
        "timestamp":[1714570200,1714570260,1714570320],
        "indicators":{"quote":[{
            "open":[170.1,null,170.4],
            "high":[170.5,null,170.6],
            "low":[169.9,null,170.2],
            "close":[170.3,null,170.5],
            "volume":[1200,null,900]
        }]}
    }],"error":null}}"#;

    fn provider(client: ScriptedHttpClient) -> YahooChartProvider {
        YahooChartProvider::new(Arc::new(client), YahooConfig::default())
    }

    #[test]
    fn parse_chart_skips_incomplete_rows() {
        let series = parse_chart(CHART).expect("chart parses");
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.rows[0].timestamp.to_utc().format_rfc3339(),
            "2024-05-01T13:30:00Z"
        );
        assert_eq!(series.rows[1].volume, Some(900));
    }

    #[test]
    fn parse_chart_surfaces_api_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(body).expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::InvalidRequest);
        assert!(err.message().contains("delisted"));
    }

    #[test]
    fn parse_chart_without_timestamps_is_empty() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse_chart(body).expect("parses").is_empty());
    }

    #[tokio::test]
    async fn prepare_caches_crumb() {
        let client = ScriptedHttpClient::new()
            .route(COOKIE_URL, HttpResponse::with_status(404, ""))
            .route(CRUMB_ENDPOINTS[0], HttpResponse::ok("abc123"));
        let provider = provider(client);

        provider.prepare().await.expect("session");
        provider.prepare().await.expect("cached session");
        assert_eq!(provider.cached_crumb().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn prepare_fails_when_no_crumb_endpoint_answers() {
        let client = ScriptedHttpClient::new()
            .route(COOKIE_URL, HttpResponse::with_status(404, ""))
            .route("https://query", HttpResponse::ok("<html>consent</html>"));
        let err = provider(client).prepare().await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn intraday_requests_extended_hours_minutes() {
        let client = Arc::new(
            ScriptedHttpClient::new()
                .route(COOKIE_URL, HttpResponse::with_status(404, ""))
                .route(CRUMB_ENDPOINTS[0], HttpResponse::ok("abc123"))
                .route(CHART_BASE_URL, HttpResponse::ok(CHART)),
        );
        let provider = YahooChartProvider::new(client.clone(), YahooConfig::default());

        let request = IntradayRequest::recent_minutes(Symbol::parse("BRK.B").expect("symbol"));
        let series = provider.intraday(request).await.expect("series");

        assert_eq!(series.len(), 2);
        let chart_url = client
            .served()
            .into_iter()
            .find(|url| url.starts_with(CHART_BASE_URL))
            .expect("chart requested");
        assert!(chart_url.contains("/BRK-B?range=1d&interval=1m&includePrePost=true"));
    }
}
