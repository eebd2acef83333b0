//! Video-on-demand show catalog access and show matching.
//!
//! The catalog is reached through the [`ShowCatalog`] trait. [`HttpCatalog`]
//! talks to the real service; [`StaticCatalog`] is an in-memory stand-in for
//! tests and offline runs. [`ShowMatcher`] picks the show closest in date to a
//! meeting document.

mod matcher;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};
use url::Url;

use flexdocs_shared::{CatalogConfig, FlexDocsError, Result};

pub use matcher::ShowMatcher;

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("flexdocs/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// CatalogShow
// ---------------------------------------------------------------------------

/// A show as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogShow {
    /// Catalog identifier (numeric ids are stringified).
    #[serde(alias = "show_id", deserialize_with = "string_or_number")]
    pub id: String,
    /// Show title.
    #[serde(alias = "name", default)]
    pub title: String,
    /// Air/recording date as the catalog reports it.
    #[serde(alias = "air_date", default)]
    pub date: Option<String>,
}

impl CatalogShow {
    /// Convenience constructor used by the in-memory catalog and tests.
    pub fn new(id: impl Into<String>, title: impl Into<String>, date: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            date: Some(date.to_string()),
        }
    }

    /// The show date, if present and in a recognised format.
    pub fn air_date(&self) -> Option<NaiveDate> {
        self.date.as_deref().and_then(parse_show_date)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Parse the date formats the catalog has been seen to emit:
/// `YYYY-MM-DD`, RFC 3339 timestamps, and `MM/DD/YYYY`.
pub fn parse_show_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())
}

/// The listing endpoint returns either a bare array or `{"shows": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ShowListing {
    Bare(Vec<CatalogShow>),
    Wrapped { shows: Vec<CatalogShow> },
}

impl From<ShowListing> for Vec<CatalogShow> {
    fn from(listing: ShowListing) -> Self {
        match listing {
            ShowListing::Bare(shows) | ShowListing::Wrapped { shows } => shows,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Source of candidate shows for a city.
pub trait ShowCatalog: Send + Sync {
    /// List all shows the catalog holds for `city`.
    fn shows_for_city(&self, city: &str) -> impl Future<Output = Result<Vec<CatalogShow>>> + Send;
}

// ---------------------------------------------------------------------------
// HttpCatalog
// ---------------------------------------------------------------------------

/// Catalog client for the HTTP listing endpoint.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    endpoint: Url,
}

impl HttpCatalog {
    /// Build a client from the `[catalog]` config section.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let endpoint = listing_endpoint(&config.base_url, &config.shows_path)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FlexDocsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// The fully-resolved listing URL (without the city query).
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Resolve `shows_path` beneath `base_url`, keeping any path prefix of the base.
///
/// `http://host/v1` + `/api/shows` → `http://host/v1/api/shows`.
fn listing_endpoint(base_url: &str, shows_path: &str) -> Result<Url> {
    let mut base = Url::parse(base_url)
        .map_err(|e| FlexDocsError::config(format!("invalid catalog URL '{base_url}': {e}")))?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(shows_path.trim_start_matches('/'))
        .map_err(|e| FlexDocsError::config(format!("invalid shows path '{shows_path}': {e}")))
}

impl ShowCatalog for HttpCatalog {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn shows_for_city(&self, city: &str) -> Result<Vec<CatalogShow>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("city", city)])
            .send()
            .await
            .map_err(|e| FlexDocsError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlexDocsError::Network(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlexDocsError::Network(format!("{}: failed to read body: {e}", self.endpoint)))?;

        let listing: ShowListing = serde_json::from_str(&body)
            .map_err(|e| FlexDocsError::Catalog(format!("unexpected listing format: {e}")))?;
        let shows: Vec<CatalogShow> = listing.into();

        debug!(count = shows.len(), "catalog listing received");
        Ok(shows)
    }
}

// ---------------------------------------------------------------------------
// StaticCatalog
// ---------------------------------------------------------------------------

/// In-memory catalog keyed by city. Cities with no entry have no shows.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    shows: HashMap<String, Vec<CatalogShow>>,
    unreachable: bool,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a show listed under `city`.
    pub fn with_show(mut self, city: &str, show: CatalogShow) -> Self {
        self.shows.entry(city.to_string()).or_default().push(show);
        self
    }

    /// A catalog whose every lookup fails with a network error.
    pub fn unreachable() -> Self {
        Self {
            shows: HashMap::new(),
            unreachable: true,
        }
    }
}

impl ShowCatalog for StaticCatalog {
    async fn shows_for_city(&self, city: &str) -> Result<Vec<CatalogShow>> {
        if self.unreachable {
            return Err(FlexDocsError::Network("catalog unreachable".into()));
        }
        Ok(self.shows.get(city).cloned().unwrap_or_default())
    }
}
