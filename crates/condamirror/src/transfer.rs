//! Download-then-upload transfer of a single artifact.
//!
//! A transfer first makes sure the artifact is in the local cache, downloading
//! it from the source channel only on a cache miss, and then force-uploads the
//! cached file to the destination channel. Nothing is retried here; a failed
//! artifact is simply still missing on the next run.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::{ArtifactParts, ParseError, parse_artifact};
use crate::cache::{ArtifactCache, CacheKey};
use crate::channel::HostUrl;
use crate::http::{HttpError, HttpRequest, HttpTransport};
use crate::subdir::Subdir;
use crate::upload::{Token, UploadError, Uploader};

/// One artifact to bring from `source` to `destination`.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: String,
    pub destination: String,
    pub subdir: Subdir,
    pub filename: String,
    pub token: Token,
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Local cache path of the uploaded artifact.
    pub path: PathBuf,
    /// True when the download step was skipped because the artifact was cached.
    pub cache_hit: bool,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("refusing artifact filename '{filename}': not a plain file name")]
    UnsafeFilename { filename: String },

    #[error("download of {url} failed with status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("cache I/O on {path} failed: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of {path} failed: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: UploadError,
    },
}

impl TransferError {
    /// Short label for the failed step, used in reports.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Parse(_) | Self::UnsafeFilename { .. } => "parse",
            Self::DownloadStatus { .. } | Self::Download { .. } | Self::Cache { .. } => "download",
            Self::Upload { .. } => "upload",
        }
    }
}

/// Moves one artifact from its source to its destination channel.
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, TransferError>;
}

/// The production transfer pipeline.
pub struct TransferPipeline {
    transport: Arc<dyn HttpTransport>,
    download_host: HostUrl,
    cache: Arc<ArtifactCache>,
    uploader: Arc<dyn Uploader>,
}

impl TransferPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        download_host: HostUrl,
        cache: Arc<ArtifactCache>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            transport,
            download_host,
            cache,
            uploader,
        }
    }

    /// Download URL of an artifact in `channel`.
    #[must_use]
    pub fn download_url(&self, channel: &str, parts: &ArtifactParts<'_>, subdir: Subdir) -> String {
        let filename = parts.to_filename();
        self.download_host.join([
            channel,
            parts.name,
            parts.version,
            "download",
            subdir.as_str(),
            filename.as_str(),
        ])
    }

    /// Make sure the artifact is cached, downloading it on a miss.
    ///
    /// Returns the cached path and whether it was already present.
    pub async fn fetch_to_cache(
        &self,
        request: &TransferRequest,
    ) -> Result<(PathBuf, bool), TransferError> {
        if !is_plain_file_name(&request.filename) {
            return Err(TransferError::UnsafeFilename {
                filename: request.filename.clone(),
            });
        }
        let parts = parse_artifact(&request.filename)?;
        let key = CacheKey {
            channel: request.source.clone(),
            package: parts.name.to_string(),
            subdir: request.subdir,
            filename: request.filename.clone(),
        };
        let path = self.cache.path_for(&key);

        let _guard = self.cache.lock(&key).await;

        let cached = self
            .cache
            .contains(&key)
            .await
            .map_err(|source| TransferError::Cache {
                path: path.clone(),
                source,
            })?;
        if cached {
            tracing::debug!(path = %path.display(), "Cache hit, skipping download");
            return Ok((path, true));
        }

        let url = self.download_url(&request.source, &parts, request.subdir);
        let response = self
            .transport
            .send(HttpRequest::get(&url))
            .await
            .map_err(|source| TransferError::Download {
                url: url.clone(),
                source,
            })?;

        if !response.is_success() {
            return Err(TransferError::DownloadStatus {
                url,
                status: response.status,
            });
        }

        tracing::debug!(
            url = %url,
            bytes = response.body.len(),
            content_type = ?response.content_type,
            "Downloaded artifact"
        );

        let path = self
            .cache
            .store(&key, &response.body)
            .await
            .map_err(|source| TransferError::Cache {
                path: path.clone(),
                source,
            })?;
        Ok((path, false))
    }
}

#[async_trait]
impl ArtifactTransfer for TransferPipeline {
    #[tracing::instrument(
        skip(self, request),
        fields(
            source = %request.source,
            destination = %request.destination,
            subdir = %request.subdir,
            filename = %request.filename
        )
    )]
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, TransferError> {
        let (path, cache_hit) = self.fetch_to_cache(request).await?;

        self.uploader
            .upload(&request.destination, &request.token, &path)
            .await
            .map_err(|source| TransferError::Upload {
                path: path.clone(),
                source,
            })?;

        Ok(TransferOutcome { path, cache_hit })
    }
}

/// Whether `name` can be used as a single path component.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
