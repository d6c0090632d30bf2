//! Mirror orchestration.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `MirrorOptions`, `MirrorReport`, `MirrorError`, constants
//! - [`progress`] - Progress reporting: `MirrorProgress`, `ProgressCallback`, `emit()`
//! - [`engine`] - The run itself: [`Mirror`]
//!
//! # Example
//!
//! ```ignore
//! use condamirror::mirror::{Mirror, MirrorOptions};
//!
//! let mirror = Mirror::new(entries, index, pipeline, cache, MirrorOptions::default())
//!     .with_rate_limiter(TransferRateLimiter::new(2));
//! let report = mirror.run(None).await?;
//! println!("Transferred {} artifacts", report.transferred);
//! ```

pub mod engine;
mod progress;
mod types;

pub use types::{
    ArtifactFailure, MirrorError, MirrorOptions, MirrorReport, PackageFailure,
    short_error_message,
};

pub use types::DEFAULT_CONCURRENCY;

pub use progress::{MirrorProgress, ProgressCallback, emit};

pub use engine::Mirror;
