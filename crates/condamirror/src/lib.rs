//! condamirror - keep conda channels in step with an upstream channel.
//!
//! For every configured entry the library compares the source and destination
//! channel indexes package by package, downloads the artifacts the destination
//! lacks into a local cache, and force-uploads them with the `anaconda` client.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use condamirror::{
//!     AnacondaIndexClient, AnacondaUploader, ArtifactCache, HostUrl, Mirror, MirrorOptions,
//!     ReqwestTransport, TransferPipeline, load_mirror_file,
//! };
//!
//! let entries = load_mirror_file("mirror.yaml".as_ref(), |name| std::env::var(name).ok())?;
//! let transport = Arc::new(ReqwestTransport::with_timeout(DEFAULT_HTTP_TIMEOUT)?);
//! let cache = Arc::new(ArtifactCache::new("download"));
//! let index = Arc::new(AnacondaIndexClient::new(transport.clone(), HostUrl::parse(DEFAULT_INDEX_HOST)?));
//! let pipeline = Arc::new(TransferPipeline::new(
//!     transport,
//!     HostUrl::parse(DEFAULT_DOWNLOAD_HOST)?,
//!     cache.clone(),
//!     Arc::new(AnacondaUploader::default()),
//! ));
//!
//! let report = Mirror::new(entries, index, pipeline, cache, MirrorOptions::default())
//!     .run(None)
//!     .await?;
//! ```

pub mod artifact;
pub mod cache;
pub mod channel;
pub mod config;
pub mod delta;
pub mod http;
pub mod index;
pub mod mirror;
pub mod rate_limit;
pub mod subdir;
pub mod transfer;
pub mod upload;

pub use artifact::{ArtifactParts, ParseError, parse_artifact};
pub use cache::{ArtifactCache, CacheKey, CacheLock};
pub use channel::{DEFAULT_DOWNLOAD_HOST, DEFAULT_INDEX_HOST, HostUrl, InvalidHost};
pub use config::{
    ConfigError, DEFAULT_MIRROR_FILE, MirrorEntry, RawMirrorEntry, load_mirror_file,
    parse_mirror_document, resolve_entries,
};
pub use delta::{MissingArtifact, MissingSet, missing_artifacts};
pub use http::{
    DEFAULT_HTTP_TIMEOUT, HttpError, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
};
pub use index::{AnacondaIndexClient, IndexEntry, IndexError, IndexFetcher};
pub use mirror::{
    Mirror, MirrorError, MirrorOptions, MirrorProgress, MirrorReport, ProgressCallback,
};
pub use rate_limit::{DEFAULT_TRANSFERS_PER_SECOND, TransferRateLimiter};
pub use subdir::{Subdir, UnsupportedSubdir};
pub use transfer::{
    ArtifactTransfer, TransferError, TransferOutcome, TransferPipeline, TransferRequest,
};
pub use upload::{AnacondaUploader, DEFAULT_UPLOAD_PROGRAM, DEFAULT_UPLOAD_TIMEOUT, Token, UploadError, Uploader};
