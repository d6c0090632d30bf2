//! condamirror CLI - mirror conda packages between anaconda.org channels.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "condamirror")]
#[command(version)]
#[command(about = "Mirror conda packages between anaconda.org channels")]
#[command(
    long_about = "condamirror keeps destination conda channels in step with source channels. \
For every entry of the mirror document it compares both channel indexes per package, \
downloads the artifacts the destination lacks and uploads them with the anaconda client."
)]
#[command(after_long_help = r#"EXAMPLES
    Mirror everything listed in ./mirror.yaml:
        $ condamirror run

    Use another mirror document and cache directory:
        $ condamirror run --config channels.yaml --cache-dir /var/cache/condamirror

    Show what would be transferred without downloading anything:
        $ condamirror run --dry-run

    Check a mirror document without touching the network:
        $ condamirror validate --config channels.yaml

    Generate shell completions:
        $ condamirror completions bash > ~/.local/share/bash-completion/completions/condamirror

MIRROR DOCUMENT
    A YAML list of entries:
      - source: andfoy
        destination: Semi-ATE
        token: ${SEMI_ATE_TOKEN}
        packages: [pyqt, qt]
        subdirs: [noarch, linux-64]

CONFIGURATION
    condamirror reads configuration from:
      1. ~/.config/condamirror/config.toml (or $XDG_CONFIG_HOME/condamirror/config.toml)
      2. ./condamirror.toml
      3. Environment variables (CONDAMIRROR_* prefix, "__" between nested keys)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    CONDAMIRROR_MIRROR__FILE                  Mirror document (default: mirror.yaml)
    CONDAMIRROR_MIRROR__CACHE_DIR             Artifact cache directory
    CONDAMIRROR_MIRROR__CONCURRENCY           Concurrent transfers per package (default: 4)
    CONDAMIRROR_MIRROR__TRANSFERS_PER_SECOND  Transfer start rate (default: 2)
    CONDAMIRROR_UPLOAD__PROGRAM               Upload client (default: anaconda)
    CONDAMIRROR_UPLOAD__ARGS                  Arguments placed before the upload subcommand
    CONDAMIRROR_HTTP__TIMEOUT_SECS            HTTP request timeout
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror every configured entry once
    Run {
        #[command(flatten)]
        opts: RunOptions,
    },
    /// Check a mirror document without contacting any channel
    Validate {
        /// Mirror document (default from config or mirror.yaml)
        #[arg(short = 'f', long = "config", value_name = "FILE")]
        mirror_file: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options for a mirror run.
#[derive(Debug, Clone, clap::Args)]
struct RunOptions {
    /// Mirror document (default from config or mirror.yaml)
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    mirror_file: Option<PathBuf>,

    /// Directory holding downloaded artifacts (default from config or the user cache dir)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Maximum concurrent transfers per package (default from config or 4)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Dry run - list missing artifacts without transferring them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Disable the transfer rate limit
    #[arg(short = 'R', long)]
    no_rate_limit: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when not attached to a terminal
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("condamirror=info,condamirror_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { opts } => {
            let stop = shutdown::setup_shutdown_handler();
            commands::run::handle_run(opts, &config, stop).await
        }
        Commands::Validate { mirror_file } => {
            let path = mirror_file.unwrap_or_else(|| config.mirror.file.clone());
            Ok(commands::validate::handle_validate(&path))
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "condamirror",
            "run",
            "-f",
            "channels.yaml",
            "--cache-dir",
            "/tmp/cache",
            "-c",
            "8",
            "-n",
            "-R",
        ])
        .unwrap();

        let Commands::Run { opts } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(opts.mirror_file, Some(PathBuf::from("channels.yaml")));
        assert_eq!(opts.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(opts.concurrency, Some(8));
        assert!(opts.dry_run);
        assert!(opts.no_rate_limit);
    }

    #[test]
    fn test_run_defaults_leave_config_in_charge() {
        let cli = Cli::try_parse_from(["condamirror", "run"]).unwrap();
        let Commands::Run { opts } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(opts.mirror_file, None);
        assert_eq!(opts.concurrency, None);
        assert!(!opts.dry_run);
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from(["condamirror", "validate", "--config", "m.yaml"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Validate { mirror_file: Some(ref p) } if p == &PathBuf::from("m.yaml")
        ));
    }
}
