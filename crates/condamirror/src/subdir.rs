//! Platform/architecture subdirectories of a conda channel.
//!
//! The set is closed: anything not listed here is rejected at configuration time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A platform/architecture bucket within a channel.
///
/// Ordering follows declaration order and is used wherever the mirror needs a
/// deterministic enumeration of subdirectories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Subdir {
    /// Platform-independent packages.
    Noarch,
    Linux64,
    LinuxAarch64,
    Win64,
    Osx64,
    OsxArm64,
}

/// A subdirectory name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported subdir '{0}', expected one of: noarch, linux-64, linux-aarch64, win-64, osx-64, osx-arm64")]
pub struct UnsupportedSubdir(pub String);

impl Subdir {
    /// Every supported subdirectory, in enumeration order.
    pub const ALL: [Subdir; 6] = [
        Subdir::Noarch,
        Subdir::Linux64,
        Subdir::LinuxAarch64,
        Subdir::Win64,
        Subdir::Osx64,
        Subdir::OsxArm64,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Subdir::Noarch => "noarch",
            Subdir::Linux64 => "linux-64",
            Subdir::LinuxAarch64 => "linux-aarch64",
            Subdir::Win64 => "win-64",
            Subdir::Osx64 => "osx-64",
            Subdir::OsxArm64 => "osx-arm64",
        }
    }
}

impl std::fmt::Display for Subdir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subdir {
    type Err = UnsupportedSubdir;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subdir::ALL
            .into_iter()
            .find(|subdir| subdir.as_str() == s)
            .ok_or_else(|| UnsupportedSubdir(s.to_string()))
    }
}

impl TryFrom<String> for Subdir {
    type Error = UnsupportedSubdir;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subdir> for String {
    fn from(value: Subdir) -> Self {
        value.as_str().to_string()
    }
}
