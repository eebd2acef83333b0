//! Shared types, error model, and configuration for flexdocs.
//!
//! This crate is the foundation depended on by all other flexdocs crates.
//! It provides:
//! - [`FlexDocsError`]: the unified error type
//! - Domain types ([`ScrapedDocument`], [`CityMapping`], [`ClassifiedDocument`],
//!   [`ShowMatch`], [`RunSummary`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, DefaultsConfig, SourceEntry, config_dir, config_file_path,
    default_cities, init_config, init_config_at, load_config, load_config_from,
};
pub use error::{FlexDocsError, Result};
pub use types::{
    CityMapping, ClassifiedDocument, ConsolidatedOutput, DocumentType, FailedEntry,
    ProcessedEntry, RunId, RunSummary, ScrapedDocument, ShowMatch, UnmatchedEntry,
    UnmatchedReason, UploadRecord, file_name_from_url, slugify,
};
