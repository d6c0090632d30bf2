//! The mirror engine.
//!
//! A run probes every channel, clears the artifact cache once, then walks the
//! entries package by package: compute what the destination lacks and push each
//! missing artifact through the transfer pipeline on a bounded pool of tasks.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;

use crate::cache::ArtifactCache;
use crate::config::MirrorEntry;
use crate::delta::{MissingArtifact, missing_artifacts};
use crate::index::IndexFetcher;
use crate::rate_limit::TransferRateLimiter;
use crate::transfer::{ArtifactTransfer, TransferError, TransferOutcome, TransferRequest};

use super::progress::{MirrorProgress, ProgressCallback, emit};
use super::types::{
    ArtifactFailure, MirrorError, MirrorOptions, MirrorReport, PackageFailure,
    short_error_message,
};

/// Drives mirror runs over a set of entries.
pub struct Mirror {
    entries: Vec<MirrorEntry>,
    index: Arc<dyn IndexFetcher>,
    transfer: Arc<dyn ArtifactTransfer>,
    cache: Arc<ArtifactCache>,
    options: MirrorOptions,
    rate_limiter: Option<TransferRateLimiter>,
    stop: Arc<AtomicBool>,
}

/// What happened to one spawned transfer.
enum TaskOutcome {
    Done(Result<TransferOutcome, TransferError>),
    Skipped,
}

impl Mirror {
    pub fn new(
        entries: Vec<MirrorEntry>,
        index: Arc<dyn IndexFetcher>,
        transfer: Arc<dyn ArtifactTransfer>,
        cache: Arc<ArtifactCache>,
        options: MirrorOptions,
    ) -> Self {
        Self {
            entries,
            index,
            transfer,
            cache,
            options,
            rate_limiter: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pace transfer starts with `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: TransferRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Stop starting new transfers once `stop` is set.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Every channel named as a source or destination, sorted and de-duplicated.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| [e.source.clone(), e.destination.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run the mirror once.
    ///
    /// Returns an error only when the run could not start; per-package and
    /// per-artifact failures are recorded in the report.
    #[tracing::instrument(skip_all, fields(entries = self.entries.len(), dry_run = self.options.dry_run))]
    pub async fn run(
        &self,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<MirrorReport, MirrorError> {
        self.probe_channels(on_progress).await?;

        if !self.options.dry_run {
            self.cache
                .reset()
                .await
                .map_err(|source| MirrorError::CacheReset {
                    path: self.cache.root().to_path_buf(),
                    source,
                })?;
            emit(
                on_progress,
                MirrorProgress::CacheReset {
                    root: self.cache.root().display().to_string(),
                },
            );
        }

        let mut report = MirrorReport::default();

        'entries: for entry in &self.entries {
            for package in &entry.packages {
                if self.stop_requested() {
                    tracing::warn!("Stop requested, not starting remaining packages");
                    break 'entries;
                }
                let package_report = self.mirror_package(entry, package, on_progress).await;
                report.merge(package_report);
            }
        }
        report.interrupted = self.stop_requested();

        emit(
            on_progress,
            MirrorProgress::MirrorComplete {
                attempted: report.attempted,
                transferred: report.transferred,
                failed: report.failed,
                planned: report.planned,
                skipped: report.skipped,
            },
        );
        tracing::info!(
            attempted = report.attempted,
            transferred = report.transferred,
            failed = report.failed,
            cache_hits = report.cache_hits,
            planned = report.planned,
            skipped = report.skipped,
            package_failures = report.package_failures.len(),
            interrupted = report.interrupted,
            "Mirror run complete"
        );

        Ok(report)
    }

    /// Check that every channel exists before anything else happens.
    async fn probe_channels(&self, on_progress: Option<&ProgressCallback>) -> Result<(), MirrorError> {
        let channels = self.channels();
        emit(
            on_progress,
            MirrorProgress::ProbingChannels {
                count: channels.len(),
            },
        );

        for channel in channels {
            let exists = self
                .index
                .channel_exists(&channel)
                .await
                .map_err(|source| MirrorError::Probe {
                    channel: channel.clone(),
                    source,
                })?;
            emit(
                on_progress,
                MirrorProgress::ChannelChecked {
                    channel: channel.clone(),
                    exists,
                },
            );
            if !exists {
                return Err(MirrorError::unreachable(channel));
            }
        }
        Ok(())
    }

    async fn mirror_package(
        &self,
        entry: &MirrorEntry,
        package: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> MirrorReport {
        let mut report = MirrorReport::default();

        emit(
            on_progress,
            MirrorProgress::ComputingDelta {
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                package: package.to_string(),
            },
        );

        let missing = match missing_artifacts(
            self.index.as_ref(),
            &entry.source,
            &entry.destination,
            package,
            &entry.subdirs,
        )
        .await
        {
            Ok(missing) => missing,
            Err(e) => {
                let message = short_error_message(&e);
                tracing::error!(package = %package, error = %e, "Failed to compute missing artifacts");
                emit(
                    on_progress,
                    MirrorProgress::PackageFailed {
                        source: entry.source.clone(),
                        destination: entry.destination.clone(),
                        package: package.to_string(),
                        error: message.clone(),
                    },
                );
                report.package_failures.push(PackageFailure {
                    source: entry.source.clone(),
                    destination: entry.destination.clone(),
                    package: package.to_string(),
                    message,
                });
                return report;
            }
        };

        emit(
            on_progress,
            MirrorProgress::DeltaComputed {
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                package: package.to_string(),
                missing: missing.len(),
            },
        );

        let artifacts = missing.artifacts();

        if self.options.dry_run {
            for artifact in artifacts {
                report.planned += 1;
                emit(
                    on_progress,
                    MirrorProgress::ArtifactPlanned {
                        package: package.to_string(),
                        subdir: artifact.subdir,
                        filename: artifact.filename,
                    },
                );
            }
            return report;
        }

        self.transfer_artifacts(entry, package, artifacts, on_progress)
            .await
    }

    /// Transfer `artifacts` on a semaphore-bounded set of tasks.
    async fn transfer_artifacts(
        &self,
        entry: &MirrorEntry,
        package: &str,
        artifacts: Vec<MissingArtifact>,
        on_progress: Option<&ProgressCallback>,
    ) -> MirrorReport {
        let mut report = MirrorReport::default();

        if artifacts.is_empty() {
            emit(
                on_progress,
                MirrorProgress::PackageComplete {
                    package: package.to_string(),
                    transferred: 0,
                    failed: 0,
                },
            );
            return report;
        }

        let concurrency = self.options.concurrency.clamp(1, artifacts.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));

        emit(
            on_progress,
            MirrorProgress::TransferringArtifacts {
                package: package.to_string(),
                count: artifacts.len(),
                concurrency,
            },
        );

        let mut handles = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let transfer = Arc::clone(&self.transfer);
            let semaphore = Arc::clone(&semaphore);
            let limiter = self.rate_limiter.clone();
            let stop = Arc::clone(&self.stop);
            let request = TransferRequest {
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                subdir: artifact.subdir,
                filename: artifact.filename.clone(),
                token: entry.token.clone(),
            };

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return TaskOutcome::Skipped;
                };
                if stop.load(Ordering::SeqCst) {
                    return TaskOutcome::Skipped;
                }
                if let Some(ref limiter) = limiter {
                    limiter.wait().await;
                }
                TaskOutcome::Done(transfer.transfer(&request).await)
            });

            handles.push((artifact, handle));
        }

        let mut transferred = 0;
        let mut failed = 0;

        for (artifact, handle) in handles {
            let failure = |stage: &'static str, message: String| ArtifactFailure {
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                package: package.to_string(),
                subdir: artifact.subdir,
                filename: artifact.filename.clone(),
                stage,
                message,
            };

            match handle.await {
                Ok(TaskOutcome::Done(Ok(outcome))) => {
                    report.attempted += 1;
                    report.transferred += 1;
                    transferred += 1;
                    if outcome.cache_hit {
                        report.cache_hits += 1;
                    }
                    emit(
                        on_progress,
                        MirrorProgress::ArtifactTransferred {
                            package: package.to_string(),
                            subdir: artifact.subdir,
                            filename: artifact.filename.clone(),
                            cache_hit: outcome.cache_hit,
                        },
                    );
                }
                Ok(TaskOutcome::Done(Err(e))) => {
                    report.attempted += 1;
                    report.failed += 1;
                    failed += 1;
                    tracing::warn!(
                        filename = %artifact.filename,
                        subdir = %artifact.subdir,
                        stage = e.stage(),
                        error = %e,
                        "Transfer failed"
                    );
                    let message = short_error_message(&e);
                    report.failures.push(failure(e.stage(), message.clone()));
                    emit(
                        on_progress,
                        MirrorProgress::TransferError {
                            package: package.to_string(),
                            subdir: artifact.subdir,
                            filename: artifact.filename.clone(),
                            error: message,
                        },
                    );
                }
                Ok(TaskOutcome::Skipped) => {
                    report.skipped += 1;
                    emit(
                        on_progress,
                        MirrorProgress::ArtifactSkipped {
                            package: package.to_string(),
                            subdir: artifact.subdir,
                            filename: artifact.filename.clone(),
                        },
                    );
                }
                Err(e) => {
                    report.attempted += 1;
                    report.failed += 1;
                    failed += 1;
                    let message = format!("Task panic: {e}");
                    report.failures.push(failure("task", message.clone()));
                    emit(
                        on_progress,
                        MirrorProgress::TransferError {
                            package: package.to_string(),
                            subdir: artifact.subdir,
                            filename: artifact.filename.clone(),
                            error: message,
                        },
                    );
                }
            }
        }

        emit(
            on_progress,
            MirrorProgress::PackageComplete {
                package: package.to_string(),
                transferred,
                failed,
            },
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::delta::test_support::FakeIndex;
    use crate::http::HttpError;
    use crate::index::{IndexEntry, IndexError};
    use crate::subdir::Subdir;
    use crate::upload::Token;

    #[derive(Default)]
    struct FakeTransfer {
        calls: Mutex<Vec<TransferRequest>>,
        fail: Vec<String>,
        stop_on_call: Option<Arc<AtomicBool>>,
    }

    impl FakeTransfer {
        fn failing(filenames: &[&str]) -> Self {
            Self {
                fail: filenames.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn filenames(&self) -> Vec<String> {
            let mut names: Vec<String> = self
                .calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.filename.clone())
                .collect();
            names.sort();
            names
        }
    }

    #[async_trait]
    impl ArtifactTransfer for FakeTransfer {
        async fn transfer(
            &self,
            request: &TransferRequest,
        ) -> Result<TransferOutcome, TransferError> {
            self.calls.lock().unwrap().push(request.clone());
            if let Some(stop) = &self.stop_on_call {
                stop.store(true, Ordering::SeqCst);
            }
            if self.fail.contains(&request.filename) {
                return Err(TransferError::DownloadStatus {
                    url: format!("https://anaconda.org/{}", request.filename),
                    status: 404,
                });
            }
            Ok(TransferOutcome {
                path: PathBuf::from(&request.filename),
                cache_hit: false,
            })
        }
    }

    /// Index whose lookups for one package always fail.
    struct BrokenPackageIndex {
        inner: FakeIndex,
        broken: &'static str,
    }

    #[async_trait]
    impl IndexFetcher for BrokenPackageIndex {
        async fn fetch_index(
            &self,
            channel: &str,
            subdir: Subdir,
        ) -> Result<Vec<IndexEntry>, IndexError> {
            self.inner.fetch_index(channel, subdir).await
        }

        async fn channel_exists(&self, channel: &str) -> Result<bool, IndexError> {
            self.inner.channel_exists(channel).await
        }

        async fn fetch_package_index(
            &self,
            channel: &str,
            subdir: Subdir,
            package: &str,
        ) -> Result<Vec<IndexEntry>, IndexError> {
            if package == self.broken {
                return Err(IndexError::Http {
                    url: format!("https://conda.anaconda.org/{channel}/{subdir}/repodata.json.bz2"),
                    source: HttpError::Transport("connection reset".to_string()),
                });
            }
            self.inner.fetch_package_index(channel, subdir, package).await
        }
    }

    fn entry(source: &str, destination: &str, packages: &[&str]) -> MirrorEntry {
        MirrorEntry {
            source: source.to_string(),
            destination: destination.to_string(),
            token: Token::new("tok"),
            packages: packages.iter().map(|s| s.to_string()).collect(),
            subdirs: Subdir::ALL.to_vec(),
        }
    }

    fn mirror(
        entries: Vec<MirrorEntry>,
        index: Arc<dyn IndexFetcher>,
        transfer: &Arc<FakeTransfer>,
        cache_root: PathBuf,
        options: MirrorOptions,
    ) -> Mirror {
        Mirror::new(
            entries,
            index,
            Arc::clone(transfer) as Arc<dyn ArtifactTransfer>,
            Arc::new(ArtifactCache::new(cache_root)),
            options,
        )
    }

    fn src_with_three_foo() -> FakeIndex {
        let index = FakeIndex::new().with_channel("dst");
        index.publish("src", Subdir::Noarch, "foo-1.0-0.tar.bz2", "foo");
        index.publish("src", Subdir::Linux64, "foo-1.1-py39_0.tar.bz2", "foo");
        index.publish("src", Subdir::Win64, "foo-1.1-py39_0.conda", "foo");
        index
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_stop_other_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let transfer = Arc::new(FakeTransfer::failing(&["foo-1.1-py39_0.tar.bz2"]));
        let mirror = mirror(
            vec![entry("src", "dst", &["foo"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            dir.path().join("cache"),
            MirrorOptions::default(),
        );

        let report = mirror.run(None).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.transferred, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.filename, "foo-1.1-py39_0.tar.bz2");
        assert_eq!(failure.subdir, Subdir::Linux64);
        assert_eq!(failure.stage, "download");
        assert_eq!(transfer.filenames().len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_channel_aborts_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let cache_root = dir.path().join("cache");
        std::fs::create_dir_all(&cache_root).unwrap();
        std::fs::write(cache_root.join("keep"), b"x").unwrap();

        let transfer = Arc::new(FakeTransfer::default());
        let mirror = mirror(
            vec![entry("src", "misspeled", &["foo"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            cache_root.clone(),
            MirrorOptions::default(),
        );

        let err = mirror.run(None).await.unwrap_err();

        assert!(matches!(
            err,
            MirrorError::UnreachableChannel { ref channel } if channel == "misspeled"
        ));
        assert!(transfer.filenames().is_empty());
        assert!(cache_root.join("keep").exists());
    }

    #[tokio::test]
    async fn test_channels_are_probed_once_each() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(src_with_three_foo().with_channel("other"));
        let transfer = Arc::new(FakeTransfer::default());
        let mirror = mirror(
            vec![
                entry("src", "dst", &["foo"]),
                entry("src", "other", &["foo"]),
                entry("dst", "other", &["bar"]),
            ],
            Arc::clone(&index) as Arc<dyn IndexFetcher>,
            &transfer,
            dir.path().join("cache"),
            MirrorOptions::default(),
        );

        mirror.run(None).await.unwrap();

        assert_eq!(
            *index.probes.lock().unwrap(),
            vec!["dst".to_string(), "other".to_string(), "src".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cache_is_reset_at_start_of_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache_root = dir.path().join("cache");
        std::fs::create_dir_all(cache_root.join("src/foo/noarch")).unwrap();
        std::fs::write(cache_root.join("src/foo/noarch/stale-1-0.tar.bz2"), b"x").unwrap();

        let transfer = Arc::new(FakeTransfer::default());
        let mirror = mirror(
            vec![entry("src", "dst", &["foo"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            cache_root.clone(),
            MirrorOptions::default(),
        );

        mirror.run(None).await.unwrap();

        assert!(cache_root.is_dir());
        assert!(!cache_root.join("src/foo/noarch/stale-1-0.tar.bz2").exists());
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_transferring() {
        let dir = tempfile::tempdir().unwrap();
        let cache_root = dir.path().join("cache");
        std::fs::create_dir_all(&cache_root).unwrap();
        std::fs::write(cache_root.join("keep"), b"x").unwrap();

        let transfer = Arc::new(FakeTransfer::default());
        let mirror = mirror(
            vec![entry("src", "dst", &["foo"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            cache_root.clone(),
            MirrorOptions {
                dry_run: true,
                ..Default::default()
            },
        );

        let report = mirror.run(None).await.unwrap();

        assert_eq!(report.planned, 3);
        assert_eq!(report.attempted, 0);
        assert!(report.is_success());
        assert!(transfer.filenames().is_empty());
        assert!(cache_root.join("keep").exists());
    }

    #[tokio::test]
    async fn test_index_failure_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let inner = src_with_three_foo();
        inner.publish("src", Subdir::Noarch, "bar-2.0-0.tar.bz2", "bar");
        let index = Arc::new(BrokenPackageIndex {
            inner,
            broken: "foo",
        });
        let transfer = Arc::new(FakeTransfer::default());
        let mirror = mirror(
            vec![entry("src", "dst", &["foo", "bar"])],
            index,
            &transfer,
            dir.path().join("cache"),
            MirrorOptions::default(),
        );

        let report = mirror.run(None).await.unwrap();

        assert_eq!(report.package_failures.len(), 1);
        assert_eq!(report.package_failures[0].package, "foo");
        assert_eq!(report.transferred, 1);
        assert_eq!(transfer.filenames(), vec!["bar-2.0-0.tar.bz2"]);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_stop_signal_skips_queued_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let transfer = Arc::new(FakeTransfer {
            stop_on_call: Some(Arc::clone(&stop)),
            ..Default::default()
        });
        let mirror = mirror(
            vec![entry("src", "dst", &["foo", "bar"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            dir.path().join("cache"),
            MirrorOptions {
                concurrency: 1,
                ..Default::default()
            },
        )
        .with_stop_signal(Arc::clone(&stop));

        let report = mirror.run(None).await.unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.transferred, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(transfer.filenames().len(), 1);
        assert!(report.interrupted);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_progress_events_cover_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap().push(event);
        });

        let transfer = Arc::new(FakeTransfer::failing(&["foo-1.0-0.tar.bz2"]));
        let mirror = mirror(
            vec![entry("src", "dst", &["foo"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            dir.path().join("cache"),
            MirrorOptions::default(),
        );

        mirror.run(Some(&callback)).await.unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(
            events.first(),
            Some(MirrorProgress::ProbingChannels { count: 2 })
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            MirrorProgress::DeltaComputed { missing: 3, .. }
        )));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, MirrorProgress::ArtifactTransferred { .. }))
                .count(),
            2
        );
        assert!(events.iter().any(|e| matches!(
            e,
            MirrorProgress::TransferError { filename, .. } if filename == "foo-1.0-0.tar.bz2"
        )));
        assert!(matches!(
            events.last(),
            Some(MirrorProgress::MirrorComplete {
                attempted: 3,
                transferred: 2,
                failed: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_run_transfers_everything() {
        let dir = tempfile::tempdir().unwrap();
        let transfer = Arc::new(FakeTransfer::default());
        let mirror = mirror(
            vec![entry("src", "dst", &["foo"])],
            Arc::new(src_with_three_foo()),
            &transfer,
            dir.path().join("cache"),
            MirrorOptions::default(),
        )
        .with_rate_limiter(TransferRateLimiter::new(100));

        let report = mirror.run(None).await.unwrap();
        assert_eq!(report.transferred, 3);
        assert_eq!(
            transfer.filenames(),
            vec![
                "foo-1.0-0.tar.bz2",
                "foo-1.1-py39_0.conda",
                "foo-1.1-py39_0.tar.bz2"
            ]
        );
    }
}
