//! Shared mirror types and constants.

use thiserror::Error;

use crate::index::IndexError;
use crate::subdir::Subdir;

/// Default number of concurrent transfers per package.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Options for a mirror run.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Maximum concurrent transfers within one package.
    pub concurrency: usize,
    /// Dry run mode - compute what is missing but don't touch the cache or transfer.
    pub dry_run: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// A single artifact that failed to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub source: String,
    pub destination: String,
    pub package: String,
    pub subdir: Subdir,
    pub filename: String,
    /// Step that failed: `parse`, `download`, `upload` or `task`.
    pub stage: &'static str,
    pub message: String,
}

/// A package whose missing artifacts could not be computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    pub source: String,
    pub destination: String,
    pub package: String,
    pub message: String,
}

/// Summary of a mirror run.
#[derive(Debug, Default)]
pub struct MirrorReport {
    /// Transfers started.
    pub attempted: usize,
    /// Transfers that completed, upload included.
    pub transferred: usize,
    /// Transfers that failed.
    pub failed: usize,
    /// Completed transfers that reused a cached download.
    pub cache_hits: usize,
    /// Missing artifacts found in dry run mode.
    pub planned: usize,
    /// Missing artifacts not attempted because of a stop request.
    pub skipped: usize,
    /// Every failed transfer.
    pub failures: Vec<ArtifactFailure>,
    /// Every package whose index could not be read.
    pub package_failures: Vec<PackageFailure>,
    /// A stop request ended the run before every package was handled.
    pub interrupted: bool,
}

impl MirrorReport {
    /// True when nothing failed and no work was left undone.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
            && self.failures.is_empty()
            && self.package_failures.is_empty()
            && self.skipped == 0
            && !self.interrupted
    }

    pub(crate) fn merge(&mut self, other: MirrorReport) {
        self.attempted += other.attempted;
        self.transferred += other.transferred;
        self.failed += other.failed;
        self.cache_hits += other.cache_hits;
        self.planned += other.planned;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.package_failures.extend(other.package_failures);
        self.interrupted |= other.interrupted;
    }
}

/// Errors that abort a mirror run before any transfer.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("channel '{channel}' does not exist or is unreachable")]
    UnreachableChannel { channel: String },

    #[error("failed to probe channel '{channel}': {source}")]
    Probe {
        channel: String,
        #[source]
        source: IndexError,
    },

    #[error("failed to reset artifact cache {path}: {source}")]
    CacheReset {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub(crate) fn unreachable(channel: impl Into<String>) -> Self {
        Self::UnreachableChannel {
            channel: channel.into(),
        }
    }
}

/// Get a short, user-friendly error message (first line only).
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}
