//! Symbol universe resolution from an HTML catalog.
//!
//! The catalog is any HTML document containing a table with a `Symbol`
//! header column. Tables carrying the `wikitable` class are searched first.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::http_client::{HttpClient, HttpRequest};
use crate::provider::SourceError;
use crate::{Symbol, Universe};

/// Default catalog: the S&P 500 constituents list.
pub const DEFAULT_CATALOG_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

const SYMBOL_HEADER: &str = "symbol";

/// Universe produced for one run together with catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedUniverse {
    pub universe: Universe,
    /// Rows read from the catalog before de-duplication.
    pub company_count: usize,
}

/// Source of the tracked symbol universe.
pub trait UniverseResolver: Send + Sync {
    /// Resolve the current universe.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the catalog cannot be retrieved, parsed, or
    /// yields no valid symbol.
    fn resolve<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUniverse, SourceError>> + Send + 'a>>;
}

/// Resolves the universe by downloading and parsing an HTML catalog.
#[derive(Clone)]
pub struct CatalogResolver {
    http_client: Arc<dyn HttpClient>,
    url: String,
    timeout_ms: u64,
}

impl CatalogResolver {
    pub fn new(http_client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl UniverseResolver for CatalogResolver {
    fn resolve<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUniverse, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let request = HttpRequest::get(self.url.as_str()).with_timeout_ms(self.timeout_ms);
            let response = self.http_client.execute(request).await.map_err(|e| {
                SourceError::unavailable(format!("catalog transport error: {}", e.message()))
            })?;

            if !response.is_success() {
                return Err(SourceError::unavailable(format!(
                    "catalog returned status {}",
                    response.status
                )));
            }

            let entries = parse_symbol_table(&response.body)?;
            let resolved = resolved_from_entries(entries)?;
            info!(
                url = %self.url,
                company_count = resolved.company_count,
                symbols = resolved.universe.len(),
                "resolved symbol universe"
            );
            Ok(resolved)
        })
    }
}

/// Fixed catalog, for tests and for pinning a universe in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<String>,
}

impl StaticCatalog {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }
}

impl UniverseResolver for StaticCatalog {
    fn resolve<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUniverse, SourceError>> + Send + 'a>> {
        Box::pin(async move { resolved_from_entries(self.entries.clone()) })
    }
}

fn resolved_from_entries(entries: Vec<String>) -> Result<ResolvedUniverse, SourceError> {
    let company_count = entries.len();
    let symbols = entries
        .iter()
        .filter_map(|entry| match Symbol::parse(entry) {
            Ok(symbol) => Some(symbol),
            Err(error) => {
                warn!(entry = %entry, %error, "skipping catalog entry");
                None
            }
        })
        .collect::<Vec<_>>();
    let universe = Universe::new(symbols)
        .map_err(|e| SourceError::parse(format!("catalog holds no usable symbol: {e}")))?;
    Ok(ResolvedUniverse {
        universe,
        company_count,
    })
}

/// Extract the raw `Symbol` column of the first matching table in `html`.
///
/// # Errors
///
/// Returns a parse error when no table has a `Symbol` header or the column is empty.
pub fn parse_symbol_table(html: &str) -> Result<Vec<String>, SourceError> {
    let document = Html::parse_document(html);
    let preferred = selector("table.wikitable")?;
    let any_table = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    let candidates = document
        .select(&preferred)
        .chain(document.select(&any_table));

    for table in candidates {
        let Some(column) = symbol_column(table, &rows, &cells) else {
            continue;
        };

        let entries: Vec<String> = table
            .select(&rows)
            .filter(|row| row.select(&cells).any(|cell| cell.value().name() == "td"))
            .filter_map(|row| row.select(&cells).nth(column))
            .map(cell_text)
            .filter(|text| !text.is_empty())
            .collect();

        if entries.is_empty() {
            continue;
        }

        debug!(column, rows = entries.len(), "catalog symbol column located");
        return Ok(entries);
    }

    Err(SourceError::parse(
        "catalog contains no table with a non-empty 'Symbol' column",
    ))
}

fn symbol_column(table: ElementRef<'_>, rows: &Selector, cells: &Selector) -> Option<usize> {
    let header = table
        .select(rows)
        .find(|row| row.select(cells).all(|cell| cell.value().name() == "th"))?;

    header
        .select(cells)
        .position(|cell| cell_text(cell).eq_ignore_ascii_case(SYMBOL_HEADER))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::internal(format!("invalid selector '{css}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};
    use crate::provider::SourceErrorKind;

    const CATALOG: &str = r#"
        <html><body>
          <table class="infobox"><tr><th>Founded</th></tr><tr><td>1957</td></tr></table>
          <table class="wikitable sortable" id="constituents">
            <tbody>
              <tr><th>Symbol</th><th>Security</th><th>GICS Sector</th></tr>
              <tr><td><a href="/aapl">AAPL</a></td><td>Apple Inc.</td><td>IT</td></tr>
              <tr><td><a href="/brk">BRK.B</a></td><td>Berkshire Hathaway</td><td>Financials</td></tr>
              <tr><td>MSFT</td><td>Microsoft</td><td>IT</td></tr>
            </tbody>
          </table>
        </body></html>
    "#;

    #[test]
    fn parses_symbol_column_from_wikitable() {
        let entries = parse_symbol_table(CATALOG).expect("table should parse");
        assert_eq!(entries, vec!["AAPL", "BRK.B", "MSFT"]);
    }

    #[test]
    fn locates_symbol_column_when_not_first() {
        let html = r#"<table><tr><th>Name</th><th>Symbol</th></tr>
            <tr><td>Apple</td><td>AAPL</td></tr></table>"#;
        let entries = parse_symbol_table(html).expect("table should parse");
        assert_eq!(entries, vec!["AAPL"]);
    }

    #[test]
    fn missing_symbol_column_is_a_parse_error() {
        let err = parse_symbol_table("<table><tr><th>Name</th></tr><tr><td>x</td></tr></table>")
            .expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Parse);
    }

    #[tokio::test]
    async fn catalog_resolver_normalizes_symbols() {
        let client = ScriptedHttpClient::new().route("https://catalog.test/", HttpResponse::ok(CATALOG));
        let resolver = CatalogResolver::new(Arc::new(client), "https://catalog.test/sp500");

        let resolved = resolver.resolve().await.expect("resolves");
        let symbols: Vec<&str> = resolved.universe.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["AAPL", "BRK-B", "MSFT"]);
        assert_eq!(resolved.company_count, 3);
    }

    #[tokio::test]
    async fn catalog_resolver_reports_bad_status_as_unavailable() {
        let client = ScriptedHttpClient::new()
            .route("https://catalog.test/", HttpResponse::with_status(503, "busy"));
        let resolver = CatalogResolver::new(Arc::new(client), "https://catalog.test/sp500");

        let err = resolver.resolve().await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn catalog_resolver_skips_unusable_rows_and_keeps_the_rest() {
        let html = r#"<table class="wikitable">
            <tr><th>Symbol</th><th>Security</th></tr>
            <tr><td>AAPL</td><td>Apple Inc.</td></tr>
            <tr><td>MSFT</td><td>Microsoft</td></tr>
            <tr><td>BRK.B</td><td>Berkshire Hathaway</td></tr>
            <tr><td>GOOG†</td><td>Alphabet</td></tr></table>"#;
        let client = ScriptedHttpClient::new().route("https://catalog.test/", HttpResponse::ok(html));
        let resolver = CatalogResolver::new(Arc::new(client), "https://catalog.test/sp500");

        let resolved = resolver.resolve().await.expect("valid rows still resolve");
        let symbols: Vec<&str> = resolved.universe.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "BRK-B"]);
        assert_eq!(resolved.company_count, 4);
    }

    #[tokio::test]
    async fn catalog_without_any_usable_row_is_rejected() {
        let err = StaticCatalog::new(["123", "GOOG†"])
            .resolve()
            .await
            .expect_err("nothing usable");
        assert_eq!(err.kind(), SourceErrorKind::Parse);
        assert!(err.message().contains("no usable symbol"));
    }

    #[tokio::test]
    async fn static_catalog_scenario() {
        let resolved = StaticCatalog::new(["AAPL", "BRK.B"]).resolve().await.expect("resolves");
        let symbols: Vec<&str> = resolved.universe.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["AAPL", "BRK-B"]);
    }
}
