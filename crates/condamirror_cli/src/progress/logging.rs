use condamirror::MirrorProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: MirrorProgress) {
        match event {
            MirrorProgress::ProbingChannels { count } => {
                tracing::info!(count, "Probing channels");
            }

            MirrorProgress::ChannelChecked { channel, exists } => {
                if exists {
                    tracing::debug!(channel = %channel, "Channel found");
                } else {
                    tracing::error!(channel = %channel, "Channel not found");
                }
            }

            MirrorProgress::CacheReset { root } => {
                tracing::debug!(root = %root, "Artifact cache cleared");
            }

            MirrorProgress::ComputingDelta {
                source,
                destination,
                package,
            } => {
                tracing::debug!(source = %source, destination = %destination, package = %package, "Comparing indexes");
            }

            MirrorProgress::DeltaComputed {
                source,
                destination,
                package,
                missing,
            } => {
                tracing::info!(
                    source = %source,
                    destination = %destination,
                    package = %package,
                    missing,
                    "Computed missing artifacts"
                );
            }

            MirrorProgress::PackageFailed {
                source,
                destination,
                package,
                error,
            } => {
                tracing::error!(
                    source = %source,
                    destination = %destination,
                    package = %package,
                    error = %error,
                    "Failed to read indexes"
                );
            }

            MirrorProgress::TransferringArtifacts {
                package,
                count,
                concurrency,
            } => {
                tracing::info!(package = %package, count, concurrency, "Transferring artifacts");
            }

            MirrorProgress::ArtifactPlanned {
                package,
                subdir,
                filename,
            } => {
                tracing::info!(package = %package, artifact = %format!("{}/{}", subdir, filename), "Would transfer");
            }

            MirrorProgress::ArtifactTransferred {
                package,
                subdir,
                filename,
                cache_hit,
            } => {
                tracing::info!(
                    package = %package,
                    artifact = %format!("{}/{}", subdir, filename),
                    cache_hit,
                    "Transferred"
                );
            }

            MirrorProgress::TransferError {
                package,
                subdir,
                filename,
                error,
            } => {
                tracing::warn!(
                    package = %package,
                    artifact = %format!("{}/{}", subdir, filename),
                    error = %error,
                    "Failed to transfer"
                );
            }

            MirrorProgress::ArtifactSkipped {
                package,
                subdir,
                filename,
            } => {
                tracing::debug!(package = %package, artifact = %format!("{}/{}", subdir, filename), "Skipped");
            }

            MirrorProgress::PackageComplete {
                package,
                transferred,
                failed,
            } => {
                tracing::info!(package = %package, transferred, failed, "Package complete");
            }

            MirrorProgress::MirrorComplete {
                attempted,
                transferred,
                failed,
                planned,
                skipped,
            } => {
                tracing::info!(attempted, transferred, failed, planned, skipped, "Mirror complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
