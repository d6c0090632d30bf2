use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use condamirror::{
    AnacondaIndexClient, AnacondaUploader, ArtifactCache, HostUrl, HttpTransport, Mirror,
    MirrorOptions, MirrorReport, ReqwestTransport, TransferPipeline, TransferRateLimiter,
    load_mirror_file,
};
use console::{Term, style};

use crate::RunOptions;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Run options after applying config defaults.
#[derive(Debug, PartialEq, Eq)]
struct RunSettings {
    mirror_file: PathBuf,
    cache_dir: PathBuf,
    concurrency: usize,
    dry_run: bool,
    /// `None` when rate limiting is disabled.
    transfers_per_second: Option<u32>,
}

fn merge_run_options(
    opts: &RunOptions,
    config: &Config,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let mirror_file = opts
        .mirror_file
        .clone()
        .unwrap_or_else(|| config.mirror.file.clone());
    let cache_dir = opts
        .cache_dir
        .clone()
        .or_else(|| config.cache_dir())
        .ok_or("Could not determine a cache directory; pass --cache-dir")?;
    let concurrency = opts
        .concurrency
        .unwrap_or(config.mirror.concurrency)
        .max(1);
    let no_rate_limit = opts.no_rate_limit || config.mirror.no_rate_limit;

    Ok(RunSettings {
        mirror_file,
        cache_dir,
        concurrency,
        dry_run: opts.dry_run,
        transfers_per_second: (!no_rate_limit).then_some(config.mirror.transfers_per_second),
    })
}

/// Mirror every configured entry once.
pub(crate) async fn handle_run(
    opts: RunOptions,
    config: &Config,
    stop: Arc<AtomicBool>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let settings = merge_run_options(&opts, config)?;
    let is_tty = Term::stdout().is_term();

    let entries = match load_mirror_file(&settings.mirror_file, |name| std::env::var(name).ok()) {
        Ok(entries) => entries,
        Err(e) => {
            for problem in e.problems() {
                eprintln!("{} {}", style("error:").red().bold(), problem);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::with_timeout(config.http_timeout())?);
    let cache = Arc::new(ArtifactCache::new(&settings.cache_dir));
    let index =
        AnacondaIndexClient::new(Arc::clone(&transport), HostUrl::parse(&config.hosts.index)?);
    let uploader = AnacondaUploader::new(&config.upload.program)
        .with_leading_args(config.upload.args.clone())
        .with_timeout(config.upload_timeout());
    let pipeline = TransferPipeline::new(
        transport,
        HostUrl::parse(&config.hosts.download)?,
        Arc::clone(&cache),
        Arc::new(uploader),
    );

    let options = MirrorOptions {
        concurrency: settings.concurrency,
        dry_run: settings.dry_run,
    };
    let mut mirror = Mirror::new(
        entries,
        Arc::new(index),
        Arc::new(pipeline),
        cache,
        options,
    )
    .with_stop_signal(stop);
    if let Some(rps) = settings.transfers_per_second {
        mirror = mirror.with_rate_limiter(TransferRateLimiter::new(rps));
    }

    tracing::info!(
        mirror_file = %settings.mirror_file.display(),
        cache_dir = %settings.cache_dir.display(),
        concurrency = settings.concurrency,
        dry_run = settings.dry_run,
        "Starting mirror run"
    );

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let result = mirror.run(Some(&callback)).await;
    reporter.finish();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if is_tty {
                eprintln!("{} {}", style("error:").red().bold(), e);
            } else {
                tracing::error!(error = %e, "Mirror run aborted");
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    print_report(&report, settings.dry_run, is_tty);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn summary_line(report: &MirrorReport, dry_run: bool) -> String {
    if dry_run {
        return format!("{} artifacts would be transferred", report.planned);
    }
    let mut line = format!(
        "{} transferred, {} failed",
        report.transferred, report.failed
    );
    if report.cache_hits > 0 {
        line.push_str(&format!(", {} from cache", report.cache_hits));
    }
    if report.skipped > 0 {
        line.push_str(&format!(", {} skipped", report.skipped));
    }
    if !report.package_failures.is_empty() {
        line.push_str(&format!(
            ", {} packages unreadable",
            report.package_failures.len()
        ));
    }
    if report.interrupted {
        line.push_str(", interrupted");
    }
    line
}

fn print_report(report: &MirrorReport, dry_run: bool, is_tty: bool) {
    let summary = summary_line(report, dry_run);
    if !is_tty {
        for failure in &report.failures {
            tracing::warn!(
                source = %failure.source,
                destination = %failure.destination,
                artifact = %format!("{}/{}", failure.subdir, failure.filename),
                stage = failure.stage,
                error = %failure.message,
                "Artifact not mirrored"
            );
        }
        tracing::info!("{}", summary);
        return;
    }

    if !report.failures.is_empty() || !report.package_failures.is_empty() {
        println!();
        println!("{}", style("Failures:").red().bold());
        for failure in &report.package_failures {
            println!(
                "  {} → {} {}: {}",
                failure.source, failure.destination, failure.package, failure.message
            );
        }
        for failure in &report.failures {
            println!(
                "  {}/{} ({}): {}",
                failure.subdir, failure.filename, failure.stage, failure.message
            );
        }
    }

    let marker = if report.is_success() {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!("\n{} {}", marker, summary);
}
