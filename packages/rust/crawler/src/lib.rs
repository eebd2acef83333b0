//! Municipal meeting-page scraper.
//!
//! Fetches a listing page and turns every linked PDF into a
//! [`ScrapedDocument`] record, the input format of the ingestion workflow.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use flexdocs_shared::{FlexDocsError, Result, ScrapedDocument};

/// User-Agent string for scrape requests.
const USER_AGENT: &str = concat!("flexdocs/", env!("CARGO_PKG_VERSION"));

/// Scrapes PDF links from municipal pages.
pub struct PdfScraper {
    client: Client,
}

impl PdfScraper {
    /// Create a scraper with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| FlexDocsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch `page_url` and return one record per distinct PDF link, tagged with `city`.
    #[instrument(skip_all, fields(page_url = %page_url, city = %city))]
    pub async fn scrape(&self, page_url: &Url, city: &str) -> Result<Vec<ScrapedDocument>> {
        let response = self
            .client
            .get(page_url.as_str())
            .send()
            .await
            .map_err(|e| FlexDocsError::Network(format!("{page_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlexDocsError::Network(format!("{page_url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlexDocsError::Network(format!("{page_url}: body read failed: {e}")))?;

        let doc = Html::parse_document(&body);
        let now = Utc::now();
        let documents: Vec<ScrapedDocument> = extract_pdf_links(&doc, page_url)
            .into_iter()
            .map(|url| ScrapedDocument {
                url,
                city: city.to_string(),
                discovered_at: now,
            })
            .collect();

        info!(city, pdfs = documents.len(), "page scraped");
        Ok(documents)
    }
}

/// Extract all PDF links from a document, resolved against the page URL.
///
/// Fragments are stripped and duplicates dropped; document order is kept.
pub fn extract_pdf_links(doc: &Html, base_url: &Url) -> Vec<String> {
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }

        let Ok(mut resolved) = base_url.join(href.trim()) else {
            debug!(href, "unresolvable link");
            continue;
        };
        resolved.set_fragment(None);

        if !is_pdf_path(&resolved) {
            continue;
        }

        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

fn is_pdf_path(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}

/// Merge freshly scraped records into an existing result set.
///
/// Records whose URL is already present are dropped, so earlier
/// `discovered_at` timestamps survive re-scrapes. Returns the number added.
pub fn merge_results(existing: &mut Vec<ScrapedDocument>, fresh: Vec<ScrapedDocument>) -> usize {
    let mut known: HashSet<String> = existing.iter().map(|d| d.url.clone()).collect();
    let before = existing.len();
    for doc in fresh {
        if known.insert(doc.url.clone()) {
            existing.push(doc);
        }
    }
    existing.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"<html><body>
        <h1>Meeting Documents</h1>
        <ul>
            <li><a href="/files/Agenda_2024-03-05.pdf">Agenda</a></li>
            <li><a href="files/Minutes%202024-02-20.PDF#page=2">Minutes</a></li>
            <li><a href="https://cdn.example.gov/packet.pdf?download=1">Packet</a></li>
            <li><a href="/files/Agenda_2024-03-05.pdf">Agenda (again)</a></li>
            <li><a href="/calendar">Calendar</a></li>
            <li><a href="#top">Top</a></li>
            <li><a href="mailto:clerk@example.gov">Clerk</a></li>
        </ul>
    </body></html>"##;

    #[test]
    fn extracts_only_distinct_pdfs() {
        let doc = Html::parse_document(LISTING);
        let base = Url::parse("https://city.example.gov/meetings/").unwrap();
        let links = extract_pdf_links(&doc, &base);

        assert_eq!(
            links,
            vec![
                "https://city.example.gov/files/Agenda_2024-03-05.pdf".to_string(),
                "https://city.example.gov/meetings/files/Minutes%202024-02-20.PDF".to_string(),
                "https://cdn.example.gov/packet.pdf?download=1".to_string(),
            ]
        );
    }

    #[test]
    fn merge_skips_known_urls() {
        let now = Utc::now();
        let doc = |url: &str| ScrapedDocument {
            url: url.into(),
            city: "Quincy".into(),
            discovered_at: now,
        };
        let mut existing = vec![doc("a.pdf")];
        let added = merge_results(&mut existing, vec![doc("a.pdf"), doc("b.pdf"), doc("b.pdf")]);
        assert_eq!(added, 1);
        assert_eq!(existing.len(), 2);
    }

    #[tokio::test]
    async fn scrape_with_mock_server() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/meetings/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let scraper = PdfScraper::new(Duration::from_secs(5)).unwrap();
        let page = Url::parse(&format!("{}/meetings/", server.uri())).unwrap();
        let docs = scraper.scrape(&page, "Quincy").await.unwrap();

        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.city == "Quincy"));
    }

    #[tokio::test]
    async fn scrape_reports_http_errors() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scraper = PdfScraper::new(Duration::from_secs(5)).unwrap();
        let page = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = scraper.scrape(&page, "Quincy").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
