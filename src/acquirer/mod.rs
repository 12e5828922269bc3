// =============================================================================
// acquirer/mod.rs — ONE GET, ONE TABLE
// =============================================================================
//
// Pulls a single HTML table off a public page and turns it into a Dataset.
// The whole network story is one GET with a timeout and an honest
// User-Agent. No retries, no backoff, no pagination: if the request fails
// or times out the source is unavailable, and if the page has no table with
// the headers we expect the schema was not found. Either way the caller
// gets a typed error and nothing partial.
//
// Parsing lives in `table` and never touches the network, so it is tested
// against fixed HTML.
// =============================================================================

pub mod table;

use std::time::Duration;

use tracing::{error, info};
use url::Url;

use crate::config::Config;
use crate::error::{Result, ToolkitError};
use crate::models::Dataset;

pub use table::parse_table;

pub const FORTUNE_500_URL: &str =
    "https://en.wikipedia.org/wiki/List_of_largest_companies_in_the_United_States_by_revenue";
pub const COUNTRY_POPULATION_URL: &str =
    "https://en.wikipedia.org/wiki/List_of_countries_and_dependencies_by_population";

/// Where to fetch from and what the table must look like.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub url: String,
    /// CSS selector for candidate tables, tried in document order.
    pub table_selector: String,
    /// Labels that must each appear (case-insensitive substring) in the header row.
    pub expected_headers: Vec<String>,
    /// Columns whose label contains one of these are parsed as numbers.
    pub numeric_keywords: Vec<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl SourceDescriptor {
    pub fn new<S: Into<String>>(
        url: impl Into<String>,
        expected_headers: impl IntoIterator<Item = S>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            url: url.into(),
            table_selector: "table.wikitable".into(),
            expected_headers: expected_headers.into_iter().map(Into::into).collect(),
            numeric_keywords: vec!["revenue".into()],
            timeout: defaults.http_timeout,
            user_agent: defaults.user_agent,
        }
    }

    /// Largest US companies by revenue.
    pub fn fortune500() -> Self {
        Self::new(FORTUNE_500_URL, ["Name", "Industry", "Revenue"])
    }

    /// Countries and dependencies by population.
    pub fn countries() -> Self {
        let mut desc = Self::new(COUNTRY_POPULATION_URL, ["Location", "Population"]);
        desc.numeric_keywords = vec!["population".into()];
        desc
    }

    /// Look up a preset by its CLI name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "fortune500" | "fortune" => Some(Self::fortune500()),
            "countries" | "population" => Some(Self::countries()),
            _ => None,
        }
    }

    /// Take timeout and User-Agent from process configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.timeout = config.http_timeout;
        self.user_agent = config.user_agent.clone();
        self
    }

    pub fn is_numeric_column(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.numeric_keywords
            .iter()
            .any(|k| label.contains(&k.to_lowercase()))
    }

    fn unavailable(&self, reason: impl Into<String>) -> ToolkitError {
        ToolkitError::SourceUnavailable {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }
}

/// GET the page body. Non-success statuses, timeouts and transport errors
/// all surface as `SourceUnavailable`.
pub async fn fetch_html(desc: &SourceDescriptor) -> Result<String> {
    let url = Url::parse(&desc.url).map_err(|e| desc.unavailable(format!("invalid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(desc.unavailable(format!("unsupported scheme '{}'", url.scheme())));
    }

    let client = reqwest::Client::builder()
        .timeout(desc.timeout)
        .user_agent(desc.user_agent.as_str())
        .build()
        .map_err(|e| desc.unavailable(format!("HTTP client: {e}")))?;

    info!(url = %url, timeout_secs = desc.timeout.as_secs(), "Fetching page");

    let response = client.get(url.clone()).send().await.map_err(|e| {
        error!(url = %url, error = %e, "Request failed");
        desc.unavailable(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        error!(url = %url, status = status.as_u16(), "Source returned an error status");
        return Err(desc.unavailable(format!("HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| desc.unavailable(format!("reading body: {e}")))?;
    info!(url = %url, bytes = body.len(), "Fetched page");
    Ok(body)
}

/// Fetch the page and extract the expected table.
pub async fn fetch(desc: &SourceDescriptor) -> Result<Dataset> {
    let html = fetch_html(desc).await?;
    parse_table(&html, desc)
}

/// `fetch` on a private current-thread runtime, for synchronous callers.
pub fn fetch_blocking(desc: &SourceDescriptor) -> Result<Dataset> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(fetch(desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TABLE: &str = r#"<html><body><table class="wikitable">
        <tr><th>Name</th><th>Industry</th><th>Revenue</th></tr>
        <tr><td>Acme</td><td>Anvils</td><td>$1,500</td></tr>
        </table></body></html>"#;

    fn local(server: &MockServer, route: &str) -> SourceDescriptor {
        let mut desc = SourceDescriptor::fortune500();
        desc.url = format!("{}{route}", server.uri());
        desc.timeout = Duration::from_secs(2);
        desc
    }

    #[tokio::test]
    async fn test_fetch_parses_served_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/companies"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TABLE))
            .expect(1)
            .mount(&server)
            .await;

        let ds = fetch(&local(&server, "/companies")).await.unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.get(0, 2), Some(&Value::Int(1500)));
    }

    #[tokio::test]
    async fn test_http_error_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch(&local(&server, "/gone")).await.unwrap_err();
        match err {
            ToolkitError::SourceUnavailable { reason, .. } => assert!(reason.contains("404")),
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(TABLE)
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let mut desc = local(&server, "/slow");
        desc.timeout = Duration::from_millis(200);
        assert!(matches!(
            fetch(&desc).await,
            Err(ToolkitError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_page_without_expected_table_is_schema_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><p>moved</p></html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            fetch(&local(&server, "/")).await,
            Err(ToolkitError::SchemaNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_http_url_is_rejected_without_a_request() {
        let mut desc = SourceDescriptor::fortune500();
        desc.url = "file:///etc/passwd".into();
        assert!(matches!(
            fetch_html(&desc).await,
            Err(ToolkitError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_presets() {
        assert_eq!(SourceDescriptor::preset("fortune500").unwrap().url, FORTUNE_500_URL);
        let countries = SourceDescriptor::preset("countries").unwrap();
        assert!(countries.is_numeric_column("Population (1 July 2024)"));
        assert!(!countries.is_numeric_column("Location"));
        assert!(SourceDescriptor::preset("nope").is_none());
    }

    #[test]
    fn test_with_config_overrides_transport() {
        let cfg = Config {
            http_timeout: Duration::from_secs(3),
            user_agent: "toolkit-test/1".into(),
            ..Config::default()
        };
        let desc = SourceDescriptor::fortune500().with_config(&cfg);
        assert_eq!(desc.timeout, Duration::from_secs(3));
        assert_eq!(desc.user_agent, "toolkit-test/1");
    }
}
