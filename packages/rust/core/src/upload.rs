//! Copy staged documents onto Flex server mount points.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use flexdocs_shared::{CityMapping, FlexDocsError, Result, UploadRecord};

/// Copies files into a city's mount point.
///
/// Existing destination files are overwritten.
#[derive(Debug, Clone, Default)]
pub struct Uploader {
    dry_run: bool,
    record_log: Option<PathBuf>,
}

impl Uploader {
    pub fn new(dry_run: bool, record_log: Option<PathBuf>) -> Self {
        Self {
            dry_run,
            record_log,
        }
    }

    /// Copy `source` to `<mount_path>/<file_name>`.
    ///
    /// `file_name` must be a single plain path component. In dry-run mode
    /// the record is computed but nothing is written.
    #[instrument(skip_all, fields(source = %source.display(), city = %mapping.city_name))]
    pub fn upload(
        &self,
        source: &Path,
        mapping: &CityMapping,
        file_name: &str,
    ) -> Result<UploadRecord> {
        ensure_plain_name(file_name)?;
        let bytes = std::fs::read(source).map_err(|e| FlexDocsError::io(source, e))?;
        let destination = mapping.mount_path.join(file_name);

        if self.dry_run {
            debug!(destination = %destination.display(), "dry run, skipping copy");
        } else if destination != source {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FlexDocsError::io(parent, e))?;
            }
            std::fs::write(&destination, &bytes)
                .map_err(|e| FlexDocsError::io(&destination, e))?;
        }

        let record = UploadRecord {
            source: source.to_path_buf(),
            destination,
            bytes: bytes.len() as u64,
            sha256: compute_hash(&bytes),
            uploaded_at: Utc::now(),
            dry_run: self.dry_run,
        };

        if let Some(log) = &self.record_log {
            append_record(log, &record)?;
        }

        info!(
            destination = %record.destination.display(),
            bytes = record.bytes,
            "document uploaded"
        );
        Ok(record)
    }
}

/// Reject names that would leave the mount point (`..`, absolute paths, separators).
fn ensure_plain_name(file_name: &str) -> Result<()> {
    let mut parts = Path::new(file_name).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) if !file_name.contains('\\') => Ok(()),
        _ => Err(FlexDocsError::validation(format!(
            "refusing to upload '{file_name}': not a plain file name"
        ))),
    }
}

/// `file_name` with a short hash of `url` spliced in before the extension.
///
/// `agenda.pdf` becomes `agenda-1a2b3c4d.pdf`. Distinct URLs get distinct names.
pub fn tagged_file_name(file_name: &str, url: &str) -> String {
    let tag = &compute_hash(url.as_bytes())[..8];
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            format!("{}-{tag}.{}", stem.to_string_lossy(), ext.to_string_lossy())
        }
        _ => format!("{file_name}-{tag}"),
    }
}

/// Append one JSON line describing `record` to `log`.
fn append_record(log: &Path, record: &UploadRecord) -> Result<()> {
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FlexDocsError::io(parent, e))?;
    }
    let line = serde_json::to_string(record)
        .map_err(|e| FlexDocsError::parse(format!("failed to serialize upload record: {e}")))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .map_err(|e| FlexDocsError::io(log, e))?;
    writeln!(file, "{line}").map_err(|e| FlexDocsError::io(log, e))
}

/// Compute SHA-256 hash of content (hex).
pub(crate) fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
