//! Uploading artifacts to a destination channel.
//!
//! Uploads go through the external `anaconda` client. Its exit status is not
//! reliable, so the combined output is scanned for the client's error marker
//! instead.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Marker the upload client prints on any failed upload.
pub const ERROR_MARKER: &str = "[ERROR]";

/// Default program used for uploads.
pub const DEFAULT_UPLOAD_PROGRAM: &str = "anaconda";

/// Default limit on a single upload invocation.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// An upload credential for a destination channel.
///
/// Formatting never reveals the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload rejected: {line}")]
    Rejected { line: String },

    #[error("failed to run upload program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

/// Pushes a local artifact file to a destination channel.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `path` to `channel`, replacing any artifact of the same name.
    async fn upload(&self, channel: &str, token: &Token, path: &Path) -> Result<(), UploadError>;
}

/// Return the first output line carrying the error marker, if any.
#[must_use]
pub fn find_error_line(output: &str) -> Option<&str> {
    output
        .lines()
        .find(|line| line.contains(ERROR_MARKER))
        .map(str::trim)
}

/// Uploader that shells out to the anaconda client.
///
/// Runs `<program> [leading args] -t <token> upload -u <channel> <path> --force`.
#[derive(Debug, Clone)]
pub struct AnacondaUploader {
    program: PathBuf,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl Default for AnacondaUploader {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_PROGRAM)
    }
}

impl AnacondaUploader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    /// Arguments inserted before the upload arguments, e.g. for a wrapper program.
    #[must_use]
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, channel: &str, token: &Token, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-t")
            .arg(token.expose())
            .arg("upload")
            .arg("-u")
            .arg(channel)
            .arg(path)
            .arg("--force");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Uploader for AnacondaUploader {
    #[tracing::instrument(skip(self, token), fields(channel = %channel, path = %path.display()))]
    async fn upload(&self, channel: &str, token: &Token, path: &Path) -> Result<(), UploadError> {
        let child = self
            .command(channel, token, path)
            .spawn()
            .map_err(|source| UploadError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| UploadError::Timeout(self.timeout))?
            .map_err(|source| UploadError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        for stream in [&stdout, &stderr] {
            if let Some(line) = find_error_line(stream) {
                return Err(UploadError::Rejected {
                    line: line.to_string(),
                });
            }
        }

        if !output.status.success() {
            tracing::warn!(
                status = %output.status,
                "Upload program exited unsuccessfully without reporting an error"
            );
        }
        Ok(())
    }
}
