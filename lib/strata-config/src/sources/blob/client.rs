use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header::LAST_MODIFIED, Client};
use url::Url;

use crate::errors::GenericError;

/// Location of a document within a blob store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlobLocation {
    /// Container holding the document.
    pub container: String,

    /// Name of the document within the container, possibly containing `/`.
    pub blob_name: String,
}

impl BlobLocation {
    /// Parses a `container/path/to/file.ext` path.
    ///
    /// Segments are trimmed and empty segments are dropped. Returns `None` if fewer than two segments remain or if the
    /// final segment has no file extension.
    pub fn parse(path: &str) -> Option<Self> {
        let segments = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let (container, rest) = segments.split_first()?;
        let file_name = rest.last()?;
        if !has_extension(file_name) {
            return None;
        }

        Some(Self {
            container: container.to_string(),
            blob_name: rest.join("/"),
        })
    }
}

fn has_extension(file_name: &str) -> bool {
    file_name.rfind('.').is_some_and(|idx| idx + 1 < file_name.len())
}

/// Properties of a stored document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlobProperties {
    /// Time the document was last modified.
    pub last_modified: DateTime<Utc>,
}

/// Read access to a single document in a blob store.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Fetches the document's properties without downloading its contents.
    async fn get_properties(&self) -> Result<BlobProperties, GenericError>;

    /// Downloads the document's contents.
    async fn download(&self) -> Result<Bytes, GenericError>;
}

/// Creates [`BlobClient`]s from a connection string and a document location.
pub trait BlobConnector: Send + Sync {
    /// Creates a client for the document at `location`.
    ///
    /// This must not perform any I/O: it only interprets the connection string.
    ///
    /// # Errors
    ///
    /// If the connection string cannot be interpreted, an error is returned.
    fn connect(&self, connection_string: &str, location: &BlobLocation) -> Result<Arc<dyn BlobClient>, GenericError>;
}

/// The default connector.
///
/// - `http://` and `https://` connection strings address an HTTP object store. The connection string is the base URL
///   of the store; the container and document name are appended to its path and any query string (such as a
///   shared access signature) is preserved.
/// - `file://` URLs and bare paths address a directory on the local filesystem, with containers as subdirectories.
#[derive(Clone, Debug, Default)]
pub struct DefaultBlobConnector {
    http: Client,
}

impl BlobConnector for DefaultBlobConnector {
    fn connect(&self, connection_string: &str, location: &BlobLocation) -> Result<Arc<dyn BlobClient>, GenericError> {
        let connection_string = connection_string.trim();

        if connection_string.starts_with("http://") || connection_string.starts_with("https://") {
            let base = Url::parse(connection_string)
                .with_context(|| format!("invalid object store URL '{}'", connection_string))?;
            let url = blob_url(&base, location)?;
            return Ok(Arc::new(HttpBlobClient {
                client: self.http.clone(),
                url,
            }));
        }

        let root = if connection_string.starts_with("file://") {
            Url::parse(connection_string)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| anyhow!("invalid file URL '{}'", connection_string))?
        } else {
            PathBuf::from(connection_string)
        };

        let mut path = root.join(&location.container);
        path.extend(location.blob_name.split('/'));
        Ok(Arc::new(FileBlobClient { path }))
    }
}

fn blob_url(base: &Url, location: &BlobLocation) -> Result<Url, GenericError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| anyhow!("object store URL '{}' cannot have a path", base))?
        .pop_if_empty()
        .push(&location.container)
        .extend(location.blob_name.split('/'));
    Ok(url)
}

/// A document served over HTTP.
///
/// Properties come from the `Last-Modified` header of a `HEAD` request, and contents from a `GET` request.
pub struct HttpBlobClient {
    client: Client,
    url: Url,
}

#[async_trait]
impl BlobClient for HttpBlobClient {
    async fn get_properties(&self) -> Result<BlobProperties, GenericError> {
        let response = self.client.head(self.url.clone()).send().await?.error_for_status()?;

        let Some(header) = response.headers().get(LAST_MODIFIED) else {
            bail!("response for '{}' has no Last-Modified header", self.url.path());
        };
        let last_modified = DateTime::parse_from_rfc2822(header.to_str()?)
            .context("invalid Last-Modified header")?
            .with_timezone(&Utc);

        Ok(BlobProperties { last_modified })
    }

    async fn download(&self) -> Result<Bytes, GenericError> {
        let response = self.client.get(self.url.clone()).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

/// A document stored on the local filesystem.
///
/// Properties come from the file's modification time.
pub struct FileBlobClient {
    path: PathBuf,
}

#[async_trait]
impl BlobClient for FileBlobClient {
    async fn get_properties(&self) -> Result<BlobProperties, GenericError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("failed to read metadata for '{}'", self.path.display()))?;
        let modified = metadata.modified()?;

        Ok(BlobProperties {
            last_modified: DateTime::<Utc>::from(modified),
        })
    }

    async fn download(&self) -> Result<Bytes, GenericError> {
        let contents = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read '{}'", self.path.display()))?;
        Ok(Bytes::from(contents))
    }
}
