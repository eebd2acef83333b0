//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use flexdocs_catalog::HttpCatalog;
use flexdocs_core::city::CityMapper;
use flexdocs_core::pipeline::{self, Pipeline, ProgressReporter, RunOptions};
use flexdocs_core::{classifier, dates};
use flexdocs_crawler::{PdfScraper, merge_results};
use flexdocs_shared::{
    AppConfig, RunSummary, SourceEntry, init_config, init_config_at, load_config,
    load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

/// Timeout for document downloads and page scrapes.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// flexdocs: route municipal meeting PDFs to Flex server mount points.
#[derive(Parser)]
#[command(
    name = "flexdocs",
    version,
    about = "Classify, match, upload and consolidate municipal meeting PDFs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.flexdocs/flexdocs.toml).
    #[arg(long, global = true, env = "FLEXDOCS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process a crawler results file end to end.
    Run {
        /// JSON array of scraped documents.
        #[arg(long)]
        results: PathBuf,

        /// Where to write the run summary (defaults to config).
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Staging directory for downloads (defaults to config).
        #[arg(long)]
        staging: Option<PathBuf>,

        /// Compute everything but write nothing to mount points.
        #[arg(long)]
        dry_run: bool,

        /// Skip building combined PDFs.
        #[arg(long)]
        no_consolidate: bool,
    },

    /// Scrape PDF links from municipal pages into a results file.
    Scrape {
        /// City to tag the scraped documents with.
        #[arg(long, requires = "url")]
        city: Option<String>,

        /// Page to scrape. Without --city/--url, all configured sources are scraped.
        #[arg(long, requires = "city")]
        url: Option<String>,

        /// Results file; existing entries are kept and new URLs appended.
        #[arg(long)]
        out: PathBuf,
    },

    /// Show how a file name would be classified and dated.
    Classify {
        /// Document file name.
        file_name: String,

        /// Source URL, consulted when the file name is inconclusive.
        #[arg(long)]
        url: Option<String>,
    },

    /// List the configured city mount points.
    Cities,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults (at --config when given).
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "flexdocs=info",
        1 => "flexdocs=debug",
        _ => "flexdocs=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            results,
            summary,
            staging,
            dry_run,
            no_consolidate,
        } => {
            let config = resolve_config(config_path)?;
            cmd_run(
                &config,
                &results,
                summary.as_deref(),
                staging.as_deref(),
                dry_run,
                no_consolidate,
            )
            .await
        }
        Command::Scrape { city, url, out } => {
            let config = resolve_config(config_path)?;
            cmd_scrape(&config, city.zip(url), &out).await
        }
        Command::Classify { file_name, url } => cmd_classify(&file_name, url.as_deref()),
        Command::Cities => cmd_cities(&resolve_config(config_path)?),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(&resolve_config(config_path)?),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: &AppConfig,
    results: &Path,
    summary_path: Option<&Path>,
    staging: Option<&Path>,
    dry_run: bool,
    no_consolidate: bool,
) -> Result<()> {
    let documents = pipeline::load_results(results)?;
    info!(
        results = %results.display(),
        documents = documents.len(),
        dry_run,
        "processing results file"
    );

    let options = RunOptions {
        staging_dir: staging
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&config.defaults.staging_dir)),
        date_tolerance_days: config.defaults.date_tolerance_days,
        consolidate: config.defaults.consolidate && !no_consolidate,
        dry_run,
        upload_log: config.defaults.upload_log.as_ref().map(PathBuf::from),
        fetch_timeout: DOWNLOAD_TIMEOUT,
    };

    let catalog = HttpCatalog::new(&config.catalog)?;
    let cities = CityMapper::new(config.cities.clone());
    let mut pipeline = Pipeline::new(cities, catalog, options)?;

    let reporter = CliProgress::new();
    let summary = pipeline.run(&documents, &reporter).await;

    let summary_path = summary_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.summary_path));
    pipeline::write_summary(&summary_path, &summary)?;

    print_summary(&summary, &summary_path, dry_run);
    Ok(())
}

fn print_summary(summary: &RunSummary, path: &Path, dry_run: bool) {
    let elapsed = summary.finished_at - summary.started_at;

    println!();
    if dry_run {
        println!("  Dry run complete, nothing was written to mount points.");
    } else {
        println!("  Run complete!");
    }
    println!("  Run ID:        {}", summary.run_id);
    println!("  Processed:     {}", summary.processed.len());
    println!("  Shows matched: {}", summary.shows_matched);
    println!("  Manual review: {}", summary.unmatched.len());
    println!("  Failed:        {}", summary.failed.len());
    println!("  Combined PDFs: {}", summary.consolidated.len());
    if !summary.cities_processed.is_empty() {
        println!("  Cities:        {}", summary.cities_processed.join(", "));
    }
    println!(
        "  Time:          {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!("  Summary:       {}", path.display());
    println!();
}

async fn cmd_scrape(
    config: &AppConfig,
    single: Option<(String, String)>,
    out: &Path,
) -> Result<()> {
    let sources = match single {
        Some((city, url)) => vec![SourceEntry { city, url }],
        None if config.sources.is_empty() => {
            return Err(eyre!(
                "no [[sources]] configured; pass --city and --url or run `flexdocs config init`"
            ));
        }
        None => config.sources.clone(),
    };

    let mut documents = if out.exists() {
        pipeline::load_results(out)?
    } else {
        Vec::new()
    };

    let scraper = PdfScraper::new(DOWNLOAD_TIMEOUT)?;
    let mut added = 0;
    let mut errors = 0;

    for source in &sources {
        let page = Url::parse(&source.url)
            .wrap_err_with(|| format!("invalid URL '{}' for {}", source.url, source.city))?;

        match scraper.scrape(&page, &source.city).await {
            Ok(found) => added += merge_results(&mut documents, found),
            Err(e) => {
                warn!(city = %source.city, url = %page, error = %e, "scrape failed, skipping");
                errors += 1;
            }
        }
    }

    pipeline::save_results(out, &documents)?;

    println!();
    println!("  Sources: {} ({errors} failed)", sources.len());
    println!("  New:     {added}");
    println!("  Total:   {}", documents.len());
    println!("  Output:  {}", out.display());
    println!();

    if errors == sources.len() {
        return Err(eyre!("every source failed to scrape"));
    }
    Ok(())
}

fn cmd_classify(file_name: &str, url: Option<&str>) -> Result<()> {
    let url = url.unwrap_or(file_name);
    let document_type = classifier::classify(file_name, url);
    match dates::extract_date(file_name).or_else(|| dates::extract_date(url)) {
        Some(date) => println!("{file_name}: {document_type} ({date})"),
        None => println!("{file_name}: {document_type} (no date found)"),
    }
    Ok(())
}

fn cmd_cities(config: &AppConfig) -> Result<()> {
    let cities = CityMapper::new(config.cities.clone());
    if cities.is_empty() {
        println!("No cities configured.");
        return Ok(());
    }

    let width = cities.iter().map(|c| c.city_name.len()).max().unwrap_or(0);
    for city in cities.iter() {
        println!(
            "  {:<width$}  {}  ({})",
            city.city_name,
            city.mount_path.display(),
            city.display_name
        );
    }
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => {
            init_config_at(p)?;
            p.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing [{current}/{total}] {url}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
