//! Progress reporting types for mirror runs.
//!
//! The engine never prints. It emits [`MirrorProgress`] events through an
//! optional callback and leaves rendering to the caller.

use crate::subdir::Subdir;

/// Progress events emitted during a mirror run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MirrorProgress {
    /// Starting to probe the channels named by the mirror entries.
    ProbingChannels {
        /// Number of distinct channels.
        count: usize,
    },

    /// A channel probe finished.
    ChannelChecked { channel: String, exists: bool },

    /// The artifact cache was cleared for this run.
    CacheReset {
        /// Cache root directory.
        root: String,
    },

    /// Starting to compare the source and destination indexes of a package.
    ComputingDelta {
        source: String,
        destination: String,
        package: String,
    },

    /// Missing artifacts of a package are known.
    DeltaComputed {
        source: String,
        destination: String,
        package: String,
        /// Number of artifacts the destination lacks.
        missing: usize,
    },

    /// The indexes of a package could not be read; its artifacts are not transferred.
    PackageFailed {
        source: String,
        destination: String,
        package: String,
        error: String,
    },

    /// Starting to transfer the missing artifacts of a package.
    TransferringArtifacts {
        package: String,
        /// Number of artifacts to transfer.
        count: usize,
        /// Concurrency level for transfers.
        concurrency: usize,
    },

    /// An artifact would be transferred (dry run).
    ArtifactPlanned {
        package: String,
        subdir: Subdir,
        filename: String,
    },

    /// An artifact was downloaded (or reused from cache) and uploaded.
    ArtifactTransferred {
        package: String,
        subdir: Subdir,
        filename: String,
        /// True if the download was skipped because the artifact was cached.
        cache_hit: bool,
    },

    /// An artifact failed to transfer.
    TransferError {
        package: String,
        subdir: Subdir,
        filename: String,
        error: String,
    },

    /// An artifact was not attempted because a stop was requested.
    ArtifactSkipped {
        package: String,
        subdir: Subdir,
        filename: String,
    },

    /// All artifacts of a package have been handled.
    PackageComplete {
        package: String,
        transferred: usize,
        failed: usize,
    },

    /// The run finished.
    MirrorComplete {
        attempted: usize,
        transferred: usize,
        failed: usize,
        planned: usize,
        skipped: usize,
    },
}

/// Callback for progress updates during a mirror run.
pub type ProgressCallback = Box<dyn Fn(MirrorProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: MirrorProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
