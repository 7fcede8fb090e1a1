//! Contract tests for the external collaborators behind traits
//!
//! Every [`PriceProvider`] and [`UniverseResolver`] implementation must
//! classify failures the same way, because the fetcher and the pipeline
//! decide between absorbing and aborting on that classification alone.

use std::sync::Arc;

use goldtick_core::{
    CatalogResolver, HttpError, HttpResponse, IntradayRequest, PriceProvider, ScriptedHttpClient,
    SourceErrorKind, StaticCatalog, Symbol, UniverseResolver, YahooChartProvider, YahooConfig,
};

const COOKIE: &str = "https://fc.yahoo.com";
const CRUMB: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const CHART: &str = "https://query1.finance.yahoo.com/v8/finance/chart/";

const AAPL_CHART: &str = r#"{"chart":{"result":[{
    "timestamp":[1714570200,1714570260],
    "indicators":{"quote":[{
        "open":[170.1,170.3],"high":[170.5,170.6],"low":[169.9,170.2],
        "close":[170.3,170.5],"volume":[1200,900]
    }]}
}],"error":null}}"#;

fn session_routes() -> ScriptedHttpClient {
    ScriptedHttpClient::new()
        .route(COOKIE, HttpResponse::with_status(404, ""))
        .route(CRUMB, HttpResponse::ok("crumb-1"))
}

fn yahoo(client: ScriptedHttpClient) -> Arc<dyn PriceProvider> {
    Arc::new(YahooChartProvider::new(Arc::new(client), YahooConfig::default()))
}

fn request(symbol: &str) -> IntradayRequest {
    IntradayRequest::recent_minutes(Symbol::parse(symbol).expect("valid symbol"))
}

// =============================================================================
// PriceProvider contract
// =============================================================================

#[tokio::test]
async fn provider_returns_utc_rows_in_time_order() {
    let provider = yahoo(session_routes().route(CHART, HttpResponse::ok(AAPL_CHART)));
    assert!(!provider.id().is_empty());

    provider.prepare().await.expect("session");
    let series = provider.intraday(request("AAPL")).await.expect("series");

    assert_eq!(series.len(), 2);
    let stamps: Vec<_> = series.rows.iter().map(|row| row.timestamp.to_utc()).collect();
    assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(series.rows.iter().all(|row| row.high >= row.low));
}

#[tokio::test]
async fn provider_rejection_of_a_symbol_is_not_retryable() {
    let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
    let provider = yahoo(session_routes().route(CHART, HttpResponse::with_status(200, body)));

    let error = provider
        .intraday(request("GONE"))
        .await
        .expect_err("delisted symbol");

    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    assert!(!error.retryable());
}

#[tokio::test]
async fn provider_outage_is_unavailable_and_retryable() {
    for response in [
        Ok(HttpResponse::with_status(503, "busy")),
        Err(HttpError::timeout("request timed out")),
    ] {
        let client = match response {
            Ok(response) => session_routes().route(CHART, response),
            Err(error) => session_routes().route_error(CHART, error),
        };
        let error = yahoo(client)
            .intraday(request("AAPL"))
            .await
            .expect_err("outage");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.retryable());
    }
}

#[tokio::test]
async fn provider_garbage_payload_is_a_parse_error() {
    let provider = yahoo(session_routes().route(CHART, HttpResponse::ok("<html>oops</html>")));

    let error = provider.intraday(request("AAPL")).await.expect_err("garbage");

    assert_eq!(error.kind(), SourceErrorKind::Parse);
}

#[tokio::test]
async fn provider_session_failure_surfaces_from_prepare() {
    let client = ScriptedHttpClient::new()
        .route_error(COOKIE, HttpError::new("connection refused"));

    let error = yahoo(client).prepare().await.expect_err("no session");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
}

// =============================================================================
// UniverseResolver contract
// =============================================================================

#[tokio::test]
async fn resolvers_normalize_and_deduplicate_in_catalog_order() {
    let html = r#"<table class="wikitable"><tr><th>Symbol</th><th>Security</th></tr>
        <tr><td>MSFT</td><td>Microsoft</td></tr>
        <tr><td>BRK.B</td><td>Berkshire Hathaway</td></tr>
        <tr><td>msft</td><td>Microsoft (dup)</td></tr></table>"#;
    let resolvers: Vec<Arc<dyn UniverseResolver>> = vec![
        Arc::new(StaticCatalog::new(["MSFT", "BRK.B", "msft"])),
        Arc::new(CatalogResolver::new(
            Arc::new(ScriptedHttpClient::new().route("https://catalog.test", HttpResponse::ok(html))),
            "https://catalog.test/sp500",
        )),
    ];

    for resolver in resolvers {
        let resolved = resolver.resolve().await.expect("resolves");
        let symbols: Vec<&str> = resolved.universe.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["MSFT", "BRK-B"]);
        assert_eq!(resolved.company_count, 3);
    }
}

#[tokio::test]
async fn resolvers_fail_on_empty_or_unusable_catalogs() {
    let resolvers: Vec<Arc<dyn UniverseResolver>> = vec![
        Arc::new(StaticCatalog::new(Vec::<String>::new())),
        Arc::new(StaticCatalog::new(["123"])),
        Arc::new(CatalogResolver::new(
            Arc::new(ScriptedHttpClient::new().route(
                "https://catalog.test",
                HttpResponse::ok("<table><tr><th>Ticker</th></tr><tr><td>AAPL</td></tr></table>"),
            )),
            "https://catalog.test/sp500",
        )),
        Arc::new(CatalogResolver::new(
            Arc::new(ScriptedHttpClient::new().route_error(
                "https://catalog.test",
                HttpError::timeout("catalog timed out"),
            )),
            "https://catalog.test/sp500",
        )),
    ];

    for resolver in resolvers {
        assert!(resolver.resolve().await.is_err());
    }
}
