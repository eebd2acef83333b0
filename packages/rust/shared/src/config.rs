//! Application configuration for flexdocs.
//!
//! User config lives at `~/.flexdocs/flexdocs.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FlexDocsError, Result};
use crate::types::CityMapping;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "flexdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".flexdocs";

// ---------------------------------------------------------------------------
// Config structs (matching flexdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Show catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// City → mount point table. Replaces the built-in table when present.
    #[serde(default = "default_cities")]
    pub cities: Vec<CityMapping>,

    /// Municipal pages scanned by `flexdocs scrape`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            catalog: CatalogConfig::default(),
            cities: default_cities(),
            sources: Vec::new(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where downloaded PDFs are staged before upload.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Where the run summary JSON is written.
    #[serde(default = "default_summary_path")]
    pub summary_path: String,

    /// Maximum distance, in days, between a meeting and its show.
    #[serde(default = "default_date_tolerance")]
    pub date_tolerance_days: u32,

    /// Whether to build combined PDFs per city/date.
    #[serde(default = "default_true")]
    pub consolidate: bool,

    /// Optional JSON-lines file recording every upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_log: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            summary_path: default_summary_path(),
            date_tolerance_days: default_date_tolerance(),
            consolidate: true,
            upload_log: None,
        }
    }
}

fn default_staging_dir() -> String {
    "var/staging".into()
}
fn default_summary_path() -> String {
    "flexdocs-summary.json".into()
}
fn default_date_tolerance() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the video-on-demand catalog service.
    #[serde(default = "default_catalog_url")]
    pub base_url: String,

    /// Path of the show listing endpoint (queried with `?city=`).
    #[serde(default = "default_shows_path")]
    pub shows_path: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_url(),
            shows_path: default_shows_path(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_catalog_url() -> String {
    "http://localhost:8080".into()
}
fn default_shows_path() -> String {
    "/api/shows".into()
}
fn default_timeout() -> u64 {
    10
}

/// `[[sources]]` entry: a municipal page listing meeting PDFs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// City the documents belong to (must match a `[[cities]]` name to be uploaded).
    pub city: String,
    /// Page to scan for PDF links.
    pub url: String,
}

/// The built-in city table used when the config file has no `[[cities]]`.
pub fn default_cities() -> Vec<CityMapping> {
    [
        ("Brockton", "/mnt/flex-1", "Brockton"),
        ("Fall River", "/mnt/flex-2", "Fall River"),
        ("New Bedford", "/mnt/flex-3", "New Bedford"),
        ("Taunton", "/mnt/flex-4", "Taunton"),
        ("Quincy", "/mnt/flex-5", "City of Quincy"),
    ]
    .into_iter()
    .map(|(city, mount, display)| CityMapping {
        city_name: city.to_string(),
        mount_path: PathBuf::from(mount),
        display_name: display.to_string(),
    })
    .collect()
}

impl AppConfig {
    /// Check the settings that would otherwise only fail mid-run.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.catalog.base_url).map_err(|e| {
            FlexDocsError::config(format!(
                "catalog.base_url '{}' is not a valid URL: {e}",
                self.catalog.base_url
            ))
        })?;

        if self.catalog.timeout_secs == 0 {
            return Err(FlexDocsError::config("catalog.timeout_secs must be > 0"));
        }

        if let Some(dup) = first_duplicate(self.cities.iter().map(|c| c.city_name.as_str())) {
            return Err(FlexDocsError::config(format!(
                "city '{dup}' appears more than once in [[cities]]"
            )));
        }

        Ok(())
    }
}

fn first_duplicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::HashSet::new();
    names.into_iter().find(|name| !seen.insert(*name))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.flexdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FlexDocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.flexdocs/flexdocs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FlexDocsError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        FlexDocsError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| FlexDocsError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FlexDocsError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| FlexDocsError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}
