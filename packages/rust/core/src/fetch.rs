//! Materialise scraped documents as local files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use flexdocs_shared::{ClassifiedDocument, FlexDocsError, Result, slugify};

use crate::upload::tagged_file_name;

/// User-Agent string for document downloads.
const USER_AGENT: &str = concat!("flexdocs/", env!("CARGO_PKG_VERSION"));

/// Downloads remote documents into a staging directory; local ones are used in place.
pub struct DocumentFetcher {
    client: Client,
    staging_dir: PathBuf,
}

impl DocumentFetcher {
    pub fn new(staging_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| FlexDocsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            staging_dir: staging_dir.into(),
        })
    }

    /// Return a local path holding the document's bytes.
    ///
    /// - `http(s)://` → downloaded to `<staging>/<city-slug>/<stem>-<url-hash>.<ext>`,
    ///   so documents sharing a file name never share a staged file
    /// - `file://` or a bare path → that path, which must exist
    #[instrument(skip_all, fields(url = %doc.source.url))]
    pub async fn fetch(&self, doc: &ClassifiedDocument) -> Result<PathBuf> {
        let raw = doc.source.url.as_str();

        match Url::parse(raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                let dest = self
                    .staging_dir
                    .join(slugify(&doc.source.city))
                    .join(tagged_file_name(&doc.file_name, raw));
                self.download(&url, &dest).await?;
                Ok(dest)
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| {
                    FlexDocsError::validation(format!("not a local file URL: {url}"))
                })?;
                ensure_exists(&path)?;
                Ok(path)
            }
            // A single-letter "scheme" is a Windows drive letter, i.e. a bare path.
            Ok(url) if url.scheme().len() > 1 => Err(FlexDocsError::validation(format!(
                "unsupported URL scheme '{}' in {raw}",
                url.scheme()
            ))),
            _ => {
                let path = PathBuf::from(raw);
                ensure_exists(&path)?;
                Ok(path)
            }
        }
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FlexDocsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlexDocsError::Network(format!("{url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FlexDocsError::Network(format!("{url}: body read failed: {e}")))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FlexDocsError::io(parent, e))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| FlexDocsError::io(dest, e))?;

        debug!(dest = %dest.display(), bytes = bytes.len(), "document downloaded");
        Ok(())
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FlexDocsError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "document not found"),
        ))
    }
}
