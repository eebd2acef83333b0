//! End-to-end `run` workflow:
//! results file → classify → map city → match show → fetch → upload → consolidate.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use flexdocs_catalog::{ShowCatalog, ShowMatcher};
use flexdocs_shared::{
    ClassifiedDocument, FailedEntry, FlexDocsError, ProcessedEntry, Result, RunId, RunSummary,
    ScrapedDocument, UnmatchedEntry, UnmatchedReason,
};

use crate::city::CityMapper;
use crate::classifier::classify_document;
use crate::consolidate::{self, GroupMember};
use crate::fetch::DocumentFetcher;
use crate::upload::{Uploader, tagged_file_name};

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Where downloaded PDFs are staged.
    pub staging_dir: PathBuf,
    /// Max days between meeting date and show date.
    pub date_tolerance_days: u32,
    /// Build combined PDFs per city/date.
    pub consolidate: bool,
    /// Compute everything, write nothing to mount points.
    pub dry_run: bool,
    /// Optional JSON-lines upload log.
    pub upload_log: Option<PathBuf>,
    /// Download timeout.
    pub fetch_timeout: Duration,
}

/// Progress callback for reporting workflow status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each document is handled.
    fn document(&self, url: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Outcome of pushing one document through the stages.
enum Outcome {
    Processed(ProcessedEntry, GroupMember),
    Unmatched(UnmatchedEntry),
}

/// The assembled workflow. Each document passes through at most once.
pub struct Pipeline<C> {
    cities: CityMapper,
    matcher: ShowMatcher<C>,
    fetcher: DocumentFetcher,
    uploader: Uploader,
    options: RunOptions,
    /// Mount-point destinations written this run, and the URL that owns each.
    claimed: HashMap<PathBuf, String>,
}

impl<C: ShowCatalog> Pipeline<C> {
    pub fn new(cities: CityMapper, catalog: C, options: RunOptions) -> Result<Self> {
        let fetcher = DocumentFetcher::new(&options.staging_dir, options.fetch_timeout)?;
        let uploader = Uploader::new(options.dry_run, options.upload_log.clone());
        let matcher = ShowMatcher::new(catalog, options.date_tolerance_days);

        Ok(Self {
            cities,
            matcher,
            fetcher,
            uploader,
            options,
            claimed: HashMap::new(),
        })
    }

    /// Process every document, then consolidate, and return the summary.
    ///
    /// Per-document errors never abort the run: they land in `failed`.
    #[instrument(skip_all, fields(documents = documents.len(), dry_run = self.options.dry_run))]
    pub async fn run(
        &mut self,
        documents: &[ScrapedDocument],
        progress: &dyn ProgressReporter,
    ) -> RunSummary {
        let run_id = RunId::new();
        let started_at = Utc::now();
        info!(%run_id, "starting run");
        self.claimed.clear();

        let mut processed = Vec::new();
        let mut unmatched = Vec::new();
        let mut failed = Vec::new();
        let mut members = Vec::new();
        let mut shows_matched = 0;

        progress.phase("Processing documents");
        let total = documents.len();
        for (i, doc) in documents.iter().enumerate() {
            progress.document(&doc.url, i + 1, total);
            let classified = classify_document(doc);

            match self.process(&classified, &mut shows_matched).await {
                Ok(Outcome::Processed(entry, member)) => {
                    processed.push(entry);
                    members.push(member);
                }
                Ok(Outcome::Unmatched(entry)) => {
                    info!(url = %doc.url, reason = ?entry.reason, "routed to manual review");
                    unmatched.push(entry);
                }
                Err(e) => {
                    warn!(url = %doc.url, error = %e, "document failed, skipping");
                    failed.push(FailedEntry {
                        url: doc.url.clone(),
                        city: doc.city.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut consolidated = Vec::new();
        if self.options.consolidate {
            progress.phase("Consolidating meeting documents");
            for group in consolidate::group_by_meeting(members) {
                match consolidate::consolidate(&group, self.options.dry_run) {
                    Ok(output) => consolidated.push(output),
                    Err(e) => {
                        warn!(output = %group.output_path().display(), error = %e, "consolidation failed");
                        failed.push(FailedEntry {
                            url: group.output_path().display().to_string(),
                            city: group.city.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let cities_processed: Vec<String> = processed
            .iter()
            .map(|p: &ProcessedEntry| p.city.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            processed,
            unmatched,
            failed,
            shows_matched,
            cities_processed,
            consolidated,
        };

        progress.done(&summary);
        info!(
            run_id = %summary.run_id,
            processed = summary.processed.len(),
            unmatched = summary.unmatched.len(),
            failed = summary.failed.len(),
            shows_matched = summary.shows_matched,
            "run complete"
        );
        summary
    }

    async fn process(
        &mut self,
        doc: &ClassifiedDocument,
        shows_matched: &mut usize,
    ) -> Result<Outcome> {
        let city = doc.source.city.as_str();
        let unmatched = |reason| {
            Outcome::Unmatched(UnmatchedEntry {
                url: doc.source.url.clone(),
                city: city.to_string(),
                document_type: doc.document_type,
                meeting_date: Some(doc.meeting_date),
                reason,
            })
        };

        let Some(mapping) = self.cities.lookup(city) else {
            return Ok(unmatched(UnmatchedReason::UnknownCity));
        };

        let Some(show) = self
            .matcher
            .match_show(city, doc.meeting_date, doc.document_type)
            .await
        else {
            return Ok(unmatched(UnmatchedReason::NoShowMatch));
        };
        *shows_matched += 1;

        let local = self.fetcher.fetch(doc).await?;
        let file_name = claim_destination(&mut self.claimed, &mapping.mount_path, doc);
        let upload = self.uploader.upload(&local, mapping, &file_name)?;

        let member = GroupMember {
            city: city.to_string(),
            meeting_date: doc.meeting_date,
            output_dir: mapping.mount_path.clone(),
            path: local,
        };
        let entry = ProcessedEntry {
            url: doc.source.url.clone(),
            city: city.to_string(),
            document_type: doc.document_type,
            meeting_date: doc.meeting_date,
            show,
            upload,
        };
        Ok(Outcome::Processed(entry, member))
    }
}

/// Pick the mount-point file name for `doc`.
///
/// The plain file name is used unless another document of this run already
/// owns it, in which case a URL-tagged name is used instead.
fn claim_destination(
    claimed: &mut HashMap<PathBuf, String>,
    mount: &Path,
    doc: &ClassifiedDocument,
) -> String {
    let url = &doc.source.url;
    let plain = mount.join(&doc.file_name);

    match claimed.get(&plain) {
        Some(owner) if owner != url => {
            let tagged = tagged_file_name(&doc.file_name, url);
            warn!(
                url = %url,
                taken_by = %owner,
                renamed = %tagged,
                "file name already used on this mount, renaming"
            );
            claimed.insert(mount.join(&tagged), url.clone());
            tagged
        }
        Some(_) => doc.file_name.clone(),
        None => {
            claimed.insert(plain, url.clone());
            doc.file_name.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Results & summary files
// ---------------------------------------------------------------------------

/// Read the crawler's JSON array of scraped documents.
pub fn load_results(path: &Path) -> Result<Vec<ScrapedDocument>> {
    let content = std::fs::read_to_string(path).map_err(|e| FlexDocsError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| FlexDocsError::parse(format!("invalid results file {}: {e}", path.display())))
}

/// Write `documents` as a pretty-printed JSON array.
pub fn save_results(path: &Path, documents: &[ScrapedDocument]) -> Result<()> {
    write_json(path, &documents)
}

/// Write the run summary as pretty-printed JSON.
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    write_json(path, summary)
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FlexDocsError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| FlexDocsError::parse(format!("failed to serialize JSON: {e}")))?;
    std::fs::write(path, json).map_err(|e| FlexDocsError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{page_widths, scratch_dir, write_pdf};
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashSet;
    use flexdocs_catalog::{CatalogShow, StaticCatalog};
    use flexdocs_shared::{CityMapping, DocumentType};

    struct Fixture {
        dir: PathBuf,
        mount: PathBuf,
        cities: CityMapper,
    }

    impl Fixture {
        fn new(label: &str) -> Self {
            let dir = scratch_dir(label);
            let mount = dir.join("mnt").join("flex-5");
            let cities = CityMapper::new(vec![CityMapping {
                city_name: "Quincy".into(),
                mount_path: mount.clone(),
                display_name: "City of Quincy".into(),
            }]);
            Self { dir, mount, cities }
        }

        fn options(&self) -> RunOptions {
            RunOptions {
                staging_dir: self.dir.join("staging"),
                date_tolerance_days: 3,
                consolidate: true,
                dry_run: false,
                upload_log: None,
                fetch_timeout: Duration::from_secs(5),
            }
        }

        fn pdf(&self, name: &str, width: i64) -> ScrapedDocument {
            let path = self.dir.join("src").join(name);
            write_pdf(&path, name, width);
            scraped(path.to_str().unwrap(), "Quincy")
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn scraped(url: &str, city: &str) -> ScrapedDocument {
        ScrapedDocument {
            url: url.into(),
            city: city.into(),
            discovered_at: Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap(),
        }
    }

    fn quincy_catalog() -> StaticCatalog {
        StaticCatalog::new().with_show("Quincy", CatalogShow::new("q-1", "City Council", "2024-03-05"))
    }

    #[tokio::test]
    async fn full_run_processes_and_consolidates() {
        let fx = Fixture::new("pipeline-full");
        let docs = vec![
            fx.pdf("Agenda_2024-03-05.pdf", 600),
            fx.pdf("Minutes_2024-03-05.pdf", 500),
            scraped("/nowhere/agenda.pdf", "Springfield"),
        ];

        let mut pipeline = Pipeline::new(fx.cities.clone(), quincy_catalog(), fx.options()).unwrap();
        let summary = pipeline.run(&docs, &SilentProgress).await;

        assert_eq!(summary.processed.len(), 2);
        assert_eq!(summary.shows_matched, 2);
        assert_eq!(summary.cities_processed, vec!["Quincy".to_string()]);
        assert_eq!(summary.unmatched.len(), 1);
        assert_eq!(summary.unmatched[0].reason, UnmatchedReason::UnknownCity);
        assert!(summary.failed.is_empty());

        assert!(fx.mount.join("Agenda_2024-03-05.pdf").is_file());
        assert!(fx.mount.join("Minutes_2024-03-05.pdf").is_file());

        assert_eq!(summary.consolidated.len(), 1);
        let combined = &summary.consolidated[0];
        assert!(combined.merged);
        assert_eq!(combined.output, fx.mount.join("quincy_2024-03-05_combined.pdf"));
        assert_eq!(page_widths(&combined.output), vec![600, 500]);
    }

    #[tokio::test]
    async fn unreachable_catalog_routes_to_manual_review() {
        let fx = Fixture::new("pipeline-unreachable");
        let docs = vec![fx.pdf("Agenda_2024-03-05.pdf", 612)];

        let mut pipeline =
            Pipeline::new(fx.cities.clone(), StaticCatalog::unreachable(), fx.options()).unwrap();
        let summary = pipeline.run(&docs, &SilentProgress).await;

        assert!(summary.processed.is_empty());
        assert!(summary.failed.is_empty());
        assert_eq!(summary.unmatched.len(), 1);
        assert_eq!(summary.unmatched[0].reason, UnmatchedReason::NoShowMatch);
        assert_eq!(summary.unmatched[0].document_type, DocumentType::Agenda);
        assert!(summary.consolidated.is_empty());
    }

    #[tokio::test]
    async fn missing_files_fail_without_aborting() {
        let fx = Fixture::new("pipeline-missing");
        let missing = fx.dir.join("src").join("Packet_2024-03-05.pdf");
        let docs = vec![
            scraped(missing.to_str().unwrap(), "Quincy"),
            fx.pdf("Agenda_2024-03-06.pdf", 612),
        ];

        let mut pipeline = Pipeline::new(fx.cities.clone(), quincy_catalog(), fx.options()).unwrap();
        let summary = pipeline.run(&docs, &SilentProgress).await;

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.processed.len(), 1);
        assert_eq!(summary.shows_matched, 2);
        assert_eq!(summary.processed[0].show.day_offset, -1);

        let single = &summary.consolidated[0];
        assert!(!single.merged);
        assert_eq!(
            std::fs::read(&single.output).unwrap(),
            std::fs::read(&single.members[0]).unwrap()
        );
    }

    #[tokio::test]
    async fn dry_run_leaves_mount_untouched() {
        let fx = Fixture::new("pipeline-dry");
        let docs = vec![
            fx.pdf("Agenda_2024-03-05.pdf", 600),
            fx.pdf("Packet_2024-03-05.pdf", 500),
        ];
        let mut options = fx.options();
        options.dry_run = true;

        let mut pipeline = Pipeline::new(fx.cities.clone(), quincy_catalog(), options).unwrap();
        let summary = pipeline.run(&docs, &SilentProgress).await;

        assert_eq!(summary.processed.len(), 2);
        assert!(summary.processed.iter().all(|p| p.upload.dry_run));
        assert_eq!(summary.consolidated.len(), 1);
        assert!(!fx.mount.exists());
    }

    #[tokio::test]
    async fn reruns_are_deterministic() {
        let fx = Fixture::new("pipeline-rerun");
        let docs = vec![
            fx.pdf("Agenda_2024-03-05.pdf", 600),
            scraped("/nowhere/minutes.pdf", "Brockton"),
        ];

        let mut first = Pipeline::new(fx.cities.clone(), quincy_catalog(), fx.options()).unwrap();
        let a = first.run(&docs, &SilentProgress).await;
        let mut second = Pipeline::new(fx.cities.clone(), quincy_catalog(), fx.options()).unwrap();
        let b = second.run(&docs, &SilentProgress).await;

        let key = |s: &RunSummary| {
            (
                s.processed
                    .iter()
                    .map(|p| (p.url.clone(), p.document_type, p.meeting_date, p.upload.destination.clone()))
                    .collect::<Vec<_>>(),
                s.unmatched
                    .iter()
                    .map(|u| (u.url.clone(), u.document_type, u.reason))
                    .collect::<Vec<_>>(),
            )
        };
        assert_eq!(key(&a), key(&b));
        assert_ne!(a.run_id, b.run_id);
    }

    #[tokio::test]
    async fn documents_sharing_a_file_name_stay_distinct() {
        let fx = Fixture::new("pipeline-same-name");
        let server = wiremock::MockServer::start().await;
        let routes = [
            ("/2024-03-05/agenda.pdf", 600),
            ("/2024-03-05/minutes.pdf", 400),
            ("/2024-03-12/agenda.pdf", 500),
            ("/council/agenda_2024-04-02.pdf", 610),
            ("/school/agenda_2024-04-02.pdf", 620),
        ];
        for (route, width) in routes {
            let fixture = fx.dir.join("fixtures").join(format!("{width}.pdf"));
            write_pdf(&fixture, route, width);
            wiremock::Mock::given(wiremock::matchers::path(route))
                .respond_with(
                    wiremock::ResponseTemplate::new(200)
                        .set_body_bytes(std::fs::read(&fixture).unwrap()),
                )
                .mount(&server)
                .await;
        }
        let docs: Vec<ScrapedDocument> = routes
            .iter()
            .map(|(route, _)| scraped(&format!("{}{route}", server.uri()), "Quincy"))
            .collect();
        let catalog = StaticCatalog::new()
            .with_show("Quincy", CatalogShow::new("q-1", "City Council", "2024-03-05"))
            .with_show("Quincy", CatalogShow::new("q-2", "City Council", "2024-03-12"))
            .with_show("Quincy", CatalogShow::new("q-3", "City Council", "2024-04-02"));

        let mut pipeline = Pipeline::new(fx.cities.clone(), catalog, fx.options()).unwrap();
        let summary = pipeline.run(&docs, &SilentProgress).await;

        assert!(summary.failed.is_empty(), "{:?}", summary.failed);
        assert_eq!(summary.processed.len(), 5);

        let destinations: HashSet<PathBuf> = summary
            .processed
            .iter()
            .map(|p| p.upload.destination.clone())
            .collect();
        assert_eq!(destinations.len(), 5);
        assert!(destinations.iter().all(|d| d.parent() == Some(fx.mount.as_path())));
        assert_eq!(page_widths(&fx.mount.join("agenda.pdf")), vec![600]);

        let widths_for = |y: i32, m: u32, d: u32| {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let output = summary
                .consolidated
                .iter()
                .find(|c| c.meeting_date == date)
                .expect("group for date");
            page_widths(&output.output)
        };
        assert_eq!(summary.consolidated.len(), 3);
        assert_eq!(widths_for(2024, 3, 5), vec![600, 400]);
        assert_eq!(widths_for(2024, 3, 12), vec![500]);
        assert_eq!(widths_for(2024, 4, 2), vec![610, 620]);
    }

    #[test]
    fn results_and_summary_files_roundtrip() {
        let fx = Fixture::new("pipeline-files");
        let results = fx.dir.join("results.json");
        std::fs::write(
            &results,
            r#"[{"url": "https://q.gov/a.pdf", "city": "Quincy", "discovered_at": "2024-03-01T00:00:00Z", "extra": true}]"#,
        )
        .unwrap();

        let docs = load_results(&results).unwrap();
        assert_eq!(docs.len(), 1);

        let copy = fx.dir.join("out").join("results.json");
        save_results(&copy, &docs).unwrap();
        assert_eq!(load_results(&copy).unwrap(), docs);

        std::fs::write(&results, "{not json").unwrap();
        assert!(matches!(load_results(&results), Err(FlexDocsError::Parse { .. })));

        let summary = RunSummary {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            processed: vec![],
            unmatched: vec![],
            failed: vec![],
            shows_matched: 0,
            cities_processed: vec![],
            consolidated: vec![],
        };
        let path = fx.dir.join("summary.json");
        write_summary(&path, &summary).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        for key in ["processed", "unmatched", "failed", "shows_matched", "cities_processed"] {
            assert!(text.contains(key), "summary has {key}");
        }
    }
}
