//! Configuration file support for condamirror.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `CONDAMIRROR_`, e.g., `CONDAMIRROR_MIRROR__CONCURRENCY`)
//! 3. Config file (./condamirror.toml, then ~/.config/condamirror/config.toml)
//! 4. Built-in defaults
//!
//! The artifact cache defaults to the platform cache directory
//! (`~/.cache/condamirror/artifacts` on Linux).
//!
//! Example config file:
//! ```toml
//! [hosts]
//! index = "https://conda.anaconda.org"
//! download = "https://anaconda.org"
//!
//! [http]
//! timeout_secs = 120
//!
//! [upload]
//! program = "anaconda"
//! args = []            # inserted before the upload arguments
//! timeout_secs = 600
//!
//! [mirror]
//! file = "mirror.yaml"
//! cache_dir = "/var/cache/condamirror"
//! concurrency = 4
//! transfers_per_second = 2
//! no_rate_limit = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use condamirror::{
    DEFAULT_DOWNLOAD_HOST, DEFAULT_HTTP_TIMEOUT, DEFAULT_INDEX_HOST, DEFAULT_TRANSFERS_PER_SECOND,
    DEFAULT_UPLOAD_PROGRAM, DEFAULT_UPLOAD_TIMEOUT, config::DEFAULT_MIRROR_FILE,
    mirror::DEFAULT_CONCURRENCY,
};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel hosts.
    pub hosts: HostsConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
    /// Upload client settings.
    pub upload: UploadConfig,
    /// Default mirror run options.
    pub mirror: MirrorConfig,
}

/// Channel hosts.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostsConfig {
    /// Host serving channel indexes.
    pub index: String,
    /// Host serving artifact downloads.
    pub download: String,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            index: DEFAULT_INDEX_HOST.to_string(),
            download: DEFAULT_DOWNLOAD_HOST.to_string(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT.as_secs(),
        }
    }
}

/// Upload client settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload program.
    pub program: PathBuf,
    /// Arguments placed before the upload arguments.
    pub args: Vec<String>,
    /// Limit on a single upload in seconds.
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_UPLOAD_PROGRAM),
            args: Vec::new(),
            timeout_secs: DEFAULT_UPLOAD_TIMEOUT.as_secs(),
        }
    }
}

/// Default mirror run options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Mirror document path.
    pub file: PathBuf,
    /// Artifact cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Maximum concurrent transfers.
    pub concurrency: usize,
    /// Transfers started per second when rate limiting.
    pub transfers_per_second: u32,
    /// Whether to disable proactive rate limiting.
    pub no_rate_limit: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_MIRROR_FILE),
            cache_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            transfers_per_second: DEFAULT_TRANSFERS_PER_SECOND,
            no_rate_limit: false,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/condamirror/config.toml)
    /// 3. Local config file (./condamirror.toml)
    /// 4. Environment variables with CONDAMIRROR_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("condamirror.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./condamirror.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., CONDAMIRROR_MIRROR__NO_RATE_LIMIT -> mirror.no_rate_limit
        builder = builder.add_source(environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs.max(1))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.timeout_secs.max(1))
    }

    /// Get the artifact cache directory, falling back to the platform cache directory.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.mirror
            .cache_dir
            .clone()
            .or_else(Self::default_cache_dir)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "condamirror").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default artifact cache directory.
    ///
    /// On Linux, this is `$XDG_CACHE_HOME/condamirror/artifacts` or `~/.cache/condamirror/artifacts`.
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "condamirror").map(|dirs| dirs.cache_dir().join("artifacts"))
    }
}

fn environment() -> Environment {
    Environment::with_prefix("CONDAMIRROR")
        .prefix_separator("_")
        .separator("__")
        .list_separator(" ")
        .with_list_parse_key("upload.args")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_toml(toml_content: &str) -> Config {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap();
        settings.try_deserialize().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hosts.index, DEFAULT_INDEX_HOST);
        assert_eq!(config.hosts.download, DEFAULT_DOWNLOAD_HOST);
        assert_eq!(config.http_timeout(), DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.upload.program, PathBuf::from("anaconda"));
        assert!(config.upload.args.is_empty());
        assert_eq!(config.upload_timeout(), DEFAULT_UPLOAD_TIMEOUT);
        assert_eq!(config.mirror.file, PathBuf::from("mirror.yaml"));
        assert_eq!(config.mirror.concurrency, 4);
        assert!(!config.mirror.no_rate_limit);
    }

    #[test]
    fn test_config_builder_with_toml_string() {
        let config = from_toml(
            r#"
            [hosts]
            index = "https://conda.example.org"

            [upload]
            program = "/usr/bin/wrapper"
            args = ["anaconda"]
            timeout_secs = 30

            [mirror]
            cache_dir = "/tmp/condamirror-cache"
            concurrency = 8
            no_rate_limit = true
        "#,
        );

        assert_eq!(config.hosts.index, "https://conda.example.org");
        assert_eq!(config.hosts.download, DEFAULT_DOWNLOAD_HOST);
        assert_eq!(config.upload.program, PathBuf::from("/usr/bin/wrapper"));
        assert_eq!(config.upload.args, vec!["anaconda"]);
        assert_eq!(config.upload_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.cache_dir(),
            Some(PathBuf::from("/tmp/condamirror-cache"))
        );
        assert_eq!(config.mirror.concurrency, 8);
        assert!(config.mirror.no_rate_limit);
    }

    #[test]
    fn test_config_builder_with_defaults() {
        let settings = ConfigBuilder::builder().build().unwrap();
        let config: Config = settings.try_deserialize().unwrap_or_default();
        assert_eq!(config.mirror.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.mirror.transfers_per_second, DEFAULT_TRANSFERS_PER_SECOND);
    }

    #[test]
    fn test_config_merging_order() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[mirror]\nconcurrency = 2\ntransfers_per_second = 5\n",
                FileFormat::Toml,
            ))
            .add_source(config::File::from_str(
                "[mirror]\nconcurrency = 6\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.mirror.concurrency, 6);
        assert_eq!(config.mirror.transfers_per_second, 5);
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        let vars: HashMap<String, String> = [
            ("CONDAMIRROR_MIRROR__CONCURRENCY", "12"),
            ("CONDAMIRROR_MIRROR__NO_RATE_LIMIT", "true"),
            ("CONDAMIRROR_UPLOAD__ARGS", "run -n base anaconda"),
            ("CONDAMIRROR_HTTP__TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = ConfigBuilder::builder()
            .add_source(environment().source(Some(vars)))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.mirror.concurrency, 12);
        assert!(config.mirror.no_rate_limit);
        assert_eq!(config.upload.args, vec!["run", "-n", "base", "anaconda"]);
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let config = from_toml("[http]\ntimeout_secs = 0\n[upload]\ntimeout_secs = 0\n");
        assert_eq!(config.http_timeout(), Duration::from_secs(1));
        assert_eq!(config.upload_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_cache_dir() {
        let cache_dir = Config::default_cache_dir();
        assert!(cache_dir.is_some());
        assert!(cache_dir.unwrap().to_string_lossy().contains("condamirror"));
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str("[mirror\nconcurrency = 4\n", FileFormat::Toml))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let config = from_toml("[mirror]\nconcurrency = 3\nunknown_field = \"ignored\"\n");
        assert_eq!(config.mirror.concurrency, 3);
    }
}
