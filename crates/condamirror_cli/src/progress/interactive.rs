use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use condamirror::MirrorProgress;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Spinner shown while channels are probed.
    probe_bar: Option<ProgressBar>,
    /// Spinner shown while indexes are compared, by package.
    delta_bars: HashMap<String, ProgressBar>,
    /// Transfer bars by package.
    transfer_bars: HashMap<String, ProgressBar>,
    /// Channels found so far.
    channels_found: usize,
}

/// Interactive progress reporter using indicatif.
///
/// Shows one spinner for channel probing, then per package a spinner while its
/// indexes are compared followed by a bar over its transfers. Failures and
/// dry-run plans are printed above the bars.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: MirrorProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            MirrorProgress::ProbingChannels { count } => {
                let pb = self.spinner("channels");
                pb.set_message(format!("Probing {} channels...", count));
                state.probe_bar = Some(pb);
            }

            MirrorProgress::ChannelChecked { channel, exists } => {
                if exists {
                    state.channels_found += 1;
                    if let Some(ref pb) = state.probe_bar {
                        pb.set_message(format!("Found {}", channel));
                    }
                } else if let Some(pb) = state.probe_bar.take() {
                    pb.abandon_with_message(format!(
                        "{} channel '{}' not found",
                        style("✗").red(),
                        channel
                    ));
                }
            }

            MirrorProgress::CacheReset { .. } => {
                if let Some(pb) = state.probe_bar.take() {
                    pb.finish_with_message(format!(
                        "{} {} channels reachable",
                        style("✓").green(),
                        state.channels_found
                    ));
                }
            }

            MirrorProgress::ComputingDelta {
                source,
                destination,
                package,
            } => {
                // Dry runs never reset the cache, so the probe spinner ends here.
                if let Some(pb) = state.probe_bar.take() {
                    pb.finish_with_message(format!(
                        "{} {} channels reachable",
                        style("✓").green(),
                        state.channels_found
                    ));
                }
                let pb = self.spinner(&package);
                pb.set_message(format!("Comparing {} → {}...", source, destination));
                state.delta_bars.insert(package, pb);
            }

            MirrorProgress::DeltaComputed {
                package, missing, ..
            } => {
                if let Some(pb) = state.delta_bars.remove(&package) {
                    if missing == 0 {
                        pb.finish_with_message(format!("{} up to date", style("✓").green()));
                    } else {
                        pb.finish_and_clear();
                    }
                }
                if missing > 0 {
                    self.multi
                        .println(format!("{:16} {} missing artifacts", package, missing))
                        .ok();
                }
            }

            MirrorProgress::PackageFailed {
                package, error, ..
            } => {
                if let Some(pb) = state.delta_bars.remove(&package) {
                    pb.abandon_with_message(format!("{} {}", style("✗").red(), error));
                }
            }

            MirrorProgress::TransferringArtifacts {
                package,
                count,
                concurrency,
            } => {
                let pb = self.multi.add(ProgressBar::new(count as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:16}", package));
                pb.set_message(format!("{} at a time", concurrency));
                state.transfer_bars.insert(package, pb);
            }

            MirrorProgress::ArtifactPlanned {
                package,
                subdir,
                filename,
            } => {
                self.multi
                    .println(format!(
                        "{:16} would transfer {}/{}",
                        package, subdir, filename
                    ))
                    .ok();
            }

            MirrorProgress::ArtifactTransferred {
                package,
                filename,
                cache_hit,
                ..
            } => {
                if let Some(pb) = state.transfer_bars.get(&package) {
                    pb.inc(1);
                    if cache_hit {
                        pb.set_message(format!("{} (cached)", filename));
                    } else {
                        pb.set_message(filename);
                    }
                }
            }

            MirrorProgress::TransferError {
                package,
                subdir,
                filename,
                error,
            } => {
                if let Some(pb) = state.transfer_bars.get(&package) {
                    pb.inc(1);
                }
                self.multi
                    .println(format!(
                        "{} {}/{}: {}",
                        style("✗").red(),
                        subdir,
                        filename,
                        error
                    ))
                    .ok();
            }

            MirrorProgress::ArtifactSkipped { package, .. } => {
                if let Some(pb) = state.transfer_bars.get(&package) {
                    pb.inc(1);
                }
            }

            MirrorProgress::PackageComplete {
                package,
                transferred,
                failed,
            } => {
                if let Some(pb) = state.transfer_bars.remove(&package) {
                    let msg = if failed == 0 {
                        format!("{} {} transferred", style("✓").green(), transferred)
                    } else {
                        format!(
                            "{} {} transferred, {} failed",
                            style("!").yellow(),
                            transferred,
                            failed
                        )
                    };
                    pb.finish_with_message(msg);
                }
            }

            MirrorProgress::MirrorComplete { .. } => {
                Self::finish_state(&mut state);
            }

            _ => {}
        }
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Self::finish_state(&mut state);
    }

    fn finish_state(state: &mut ProgressState) {
        if let Some(pb) = state.probe_bar.take()
            && !pb.is_finished()
        {
            pb.finish();
        }
        for (_, pb) in state.delta_bars.drain() {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
        for (_, pb) in state.transfer_bars.drain() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner(&self, prefix: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(format!("{:16}", prefix));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
