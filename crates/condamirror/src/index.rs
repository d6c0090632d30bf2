//! Channel index retrieval.
//!
//! Every channel subdirectory publishes a bzip2-compressed `repodata.json` whose
//! `packages` object maps artifact filenames to package records. Only the declared
//! package `name` of each record is needed for mirroring.

use std::collections::HashMap;
use std::sync::Arc;

use async_compression::tokio::bufread::BzDecoder;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::channel::{HostUrl, INDEX_FILENAME};
use crate::http::{HttpError, HttpRequest, HttpTransport};
use crate::subdir::Subdir;

/// One artifact listed in a channel subdirectory index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry {
    /// Artifact filename, e.g. `foo-1.0-0.tar.bz2`.
    pub filename: String,
    /// Package name declared by the index for this artifact.
    pub name: String,
}

impl IndexEntry {
    pub fn new(filename: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            name: name.into(),
        }
    }
}

/// Why an index document could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bzip2 decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("invalid index JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// The index was served but is malformed.
    #[error("failed to decode index {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },

    /// The index could not be retrieved at all.
    #[error("failed to fetch index {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: HttpError,
    },
}

#[derive(Deserialize)]
struct RepoData {
    packages: HashMap<String, PackageRecord>,
}

#[derive(Deserialize)]
struct PackageRecord {
    name: String,
}

/// Decompress and decode a `repodata.json.bz2` document.
///
/// Entries are returned sorted by filename.
pub async fn decode_index(compressed: &[u8]) -> Result<Vec<IndexEntry>, DecodeError> {
    let mut json = Vec::new();
    BzDecoder::new(compressed).read_to_end(&mut json).await?;

    let repodata: RepoData = serde_json::from_slice(&json)?;
    let mut entries: Vec<IndexEntry> = repodata
        .packages
        .into_iter()
        .map(|(filename, record)| IndexEntry {
            filename,
            name: record.name,
        })
        .collect();
    entries.sort();
    Ok(entries)
}

/// Keep only the entries whose declared package name is `package`.
#[must_use]
pub fn filter_by_package(entries: Vec<IndexEntry>, package: &str) -> Vec<IndexEntry> {
    entries.into_iter().filter(|e| e.name == package).collect()
}

/// Source of channel indexes.
///
/// The production implementation is [`AnacondaIndexClient`]; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    /// List every artifact published in `channel/subdir`.
    ///
    /// A subdirectory without a published index yields an empty list.
    async fn fetch_index(&self, channel: &str, subdir: Subdir)
    -> Result<Vec<IndexEntry>, IndexError>;

    /// Probe whether `channel` exists.
    async fn channel_exists(&self, channel: &str) -> Result<bool, IndexError>;

    /// List the artifacts of a single package in `channel/subdir`.
    async fn fetch_package_index(
        &self,
        channel: &str,
        subdir: Subdir,
        package: &str,
    ) -> Result<Vec<IndexEntry>, IndexError> {
        let entries = self.fetch_index(channel, subdir).await?;
        Ok(filter_by_package(entries, package))
    }
}

/// Index fetcher for anaconda.org-style channel hosts.
#[derive(Clone)]
pub struct AnacondaIndexClient {
    transport: Arc<dyn HttpTransport>,
    index_host: HostUrl,
}

impl AnacondaIndexClient {
    pub fn new(transport: Arc<dyn HttpTransport>, index_host: HostUrl) -> Self {
        Self {
            transport,
            index_host,
        }
    }

    /// URL of the compressed index for `channel/subdir`.
    #[must_use]
    pub fn index_url(&self, channel: &str, subdir: Subdir) -> String {
        self.index_host
            .join([channel, subdir.as_str(), INDEX_FILENAME])
    }
}

#[async_trait]
impl IndexFetcher for AnacondaIndexClient {
    #[tracing::instrument(skip(self), fields(channel = %channel, subdir = %subdir))]
    async fn fetch_index(
        &self,
        channel: &str,
        subdir: Subdir,
    ) -> Result<Vec<IndexEntry>, IndexError> {
        let url = self.index_url(channel, subdir);
        let response = self
            .transport
            .send(HttpRequest::get(&url))
            .await
            .map_err(|source| IndexError::Http {
                url: url.clone(),
                source,
            })?;

        if !response.is_success() {
            tracing::debug!(status = response.status, url = %url, "No index published");
            return Ok(Vec::new());
        }

        let entries = decode_index(&response.body)
            .await
            .map_err(|source| IndexError::Decode { url, source })?;
        tracing::debug!(count = entries.len(), "Fetched index");
        Ok(entries)
    }

    #[tracing::instrument(skip(self), fields(channel = %channel))]
    async fn channel_exists(&self, channel: &str) -> Result<bool, IndexError> {
        let url = self.index_url(channel, Subdir::Noarch);
        let response = self
            .transport
            .send(HttpRequest::get(&url))
            .await
            .map_err(|source| IndexError::Http {
                url: url.clone(),
                source,
            })?;

        if !response.is_success() {
            tracing::debug!(status = response.status, url = %url, "Channel probe failed");
        }
        Ok(response.is_success())
    }
}
