//! Core domain types for the document ingestion workflow.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one workflow invocation (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One record of the crawler's results file.
///
/// Extra fields written by the crawler are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedDocument {
    /// Where the PDF lives (`http(s)://`, `file://`, or a bare local path).
    pub url: String,
    /// City name as reported by the crawler.
    pub city: String,
    /// When the crawler found the document.
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
}

impl ScrapedDocument {
    /// The document's file name, derived from the last URL path segment.
    pub fn file_name(&self) -> String {
        file_name_from_url(&self.url)
    }
}

/// One row of the static city table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityMapping {
    /// City name exactly as the crawler reports it.
    pub city_name: String,
    /// Flex server mount point receiving this city's documents.
    pub mount_path: PathBuf,
    /// Human-readable name.
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// DocumentType
// ---------------------------------------------------------------------------

/// Document-type label assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Agenda,
    Minutes,
    Packet,
    Other,
}

impl DocumentType {
    /// Lowercase label used in summaries and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agenda => "agenda",
            Self::Minutes => "minutes",
            Self::Packet => "packet",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scraped document after classification and date extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    /// The original crawler record.
    #[serde(flatten)]
    pub source: ScrapedDocument,
    /// Classifier label.
    pub document_type: DocumentType,
    /// File name derived from the URL.
    pub file_name: String,
    /// Meeting date the document belongs to.
    pub meeting_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Show matching & upload outcomes
// ---------------------------------------------------------------------------

/// The catalog show chosen for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowMatch {
    /// Catalog identifier.
    pub show_id: String,
    /// Show title.
    pub title: String,
    /// 1.0 for a same-day match, decreasing with day distance.
    pub confidence: f64,
    /// Show date minus meeting date, in days.
    pub day_offset: i64,
}

/// Outcome of copying one file onto a mount point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes: u64,
    /// SHA-256 of the copied content (hex).
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
    /// True when nothing was written (dry run).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// A document that went all the way through the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub url: String,
    pub city: String,
    pub document_type: DocumentType,
    pub meeting_date: NaiveDate,
    pub show: ShowMatch,
    pub upload: UploadRecord,
}

/// Why a document needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// The city is not in the mount-point table.
    UnknownCity,
    /// No catalog show within the date tolerance (or catalog unavailable).
    NoShowMatch,
}

/// A document routed to manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedEntry {
    pub url: String,
    pub city: String,
    pub document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_date: Option<NaiveDate>,
    pub reason: UnmatchedReason,
}

/// A document skipped because of an I/O or network error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEntry {
    pub url: String,
    pub city: String,
    pub error: String,
}

/// One consolidated file written for a city/date group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedOutput {
    pub city: String,
    pub meeting_date: NaiveDate,
    /// Member source paths, in merge order.
    pub members: Vec<PathBuf>,
    pub output: PathBuf,
    /// False when a single member was copied unchanged.
    pub merged: bool,
}

/// The JSON summary written at the end of a run for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: Vec<ProcessedEntry>,
    pub unmatched: Vec<UnmatchedEntry>,
    pub failed: Vec<FailedEntry>,
    pub shows_matched: usize,
    /// Distinct cities with at least one processed document, sorted.
    pub cities_processed: Vec<String>,
    #[serde(default)]
    pub consolidated: Vec<ConsolidatedOutput>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fallback name for URLs that end in a slash or carry no path at all.
const FALLBACK_FILE_NAME: &str = "document.pdf";

/// Derive a file name from a URL or bare path (last segment, percent-decoded).
///
/// The result is always a single plain path component: anything before an
/// encoded separator is dropped, and `.`/`..` fall back to a fixed name.
pub fn file_name_from_url(raw: &str) -> String {
    let segment = match Url::parse(raw) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            }),
        Err(_) => Path::new(raw)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    };

    segment
        .as_deref()
        .and_then(plain_file_name)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// The last `/`- or `\`-separated component of `name`, if it is a usable file name.
fn plain_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return None;
    }
    Some(last.to_string())
}

/// Lowercase, filesystem-safe slug (`"St. Paul"` → `"st-paul"`).
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scraped_document_ignores_extra_fields() {
        let json = r#"{
            "url": "https://city.example.gov/docs/Agenda_2024-03-05.pdf",
            "city": "Springfield",
            "discovered_at": "2024-03-01T12:00:00Z",
            "title": "Council Agenda",
            "size": 1234
        }"#;
        let doc: ScrapedDocument = serde_json::from_str(json).expect("deserialize");
        assert_eq!(doc.city, "Springfield");
        assert_eq!(doc.file_name(), "Agenda_2024-03-05.pdf");
    }

    #[test]
    fn scraped_document_defaults_discovered_at() {
        let doc: ScrapedDocument =
            serde_json::from_str(r#"{"url": "a.pdf", "city": "X"}"#).expect("deserialize");
        assert!(doc.discovered_at <= Utc::now());
    }

    #[test]
    fn file_name_from_various_urls() {
        assert_eq!(
            file_name_from_url("https://example.gov/files/City%20Council%20Minutes.pdf?v=2"),
            "City Council Minutes.pdf"
        );
        assert_eq!(file_name_from_url("/tmp/staging/packet.pdf"), "packet.pdf");
        assert_eq!(file_name_from_url("https://example.gov/"), FALLBACK_FILE_NAME);
    }

    #[test]
    fn file_name_never_escapes_its_directory() {
        assert_eq!(
            file_name_from_url("https://evil.example/..%2F..%2Fescaped.pdf"),
            "escaped.pdf"
        );
        assert_eq!(file_name_from_url("https://evil.example/%2Ftmp%2Fabs.pdf"), "abs.pdf");
        assert_eq!(file_name_from_url("https://evil.example/a%5C..%5Cwin.pdf"), "win.pdf");
        assert_eq!(file_name_from_url("https://evil.example/docs/%2E%2E"), FALLBACK_FILE_NAME);
        assert_eq!(file_name_from_url("https://evil.example/x%2F"), FALLBACK_FILE_NAME);
        assert_eq!(file_name_from_url("/var/docs/.."), FALLBACK_FILE_NAME);

        let name = file_name_from_url("https://evil.example/..%2F..%2Fescaped.pdf");
        assert_eq!(Path::new("/mnt/flex-1").join(&name), Path::new("/mnt/flex-1/escaped.pdf"));
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("St. Paul"), "st-paul");
        assert_eq!(slugify("  North  Andover "), "north-andover");
        assert_eq!(slugify("!!!"), "unknown");
    }

    #[test]
    fn document_type_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentType::Minutes).expect("serialize");
        assert_eq!(json, "\"minutes\"");
        assert_eq!(DocumentType::Agenda.to_string(), "agenda");
    }

    #[test]
    fn unmatched_reason_serializes_snake_case() {
        let json = serde_json::to_string(&UnmatchedReason::UnknownCity).expect("serialize");
        assert_eq!(json, "\"unknown_city\"");
    }
}
