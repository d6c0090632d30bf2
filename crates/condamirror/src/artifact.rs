//! Artifact filename parsing.
//!
//! A conda artifact filename encodes `<name>-<version>-<build>` followed by the
//! archive extension (which stays attached to the build token). Package names may
//! themselves contain hyphens, so the split happens from the right.

use thiserror::Error;

/// An artifact filename that does not encode name, version and build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed artifact filename '{filename}': expected <name>-<version>-<build>")]
pub struct ParseError {
    pub filename: String,
}

/// The components of an artifact filename, borrowed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactParts<'a> {
    pub name: &'a str,
    pub version: &'a str,
    /// Build string including the archive extension, e.g. `py39_0.tar.bz2`.
    pub build: &'a str,
}

impl ArtifactParts<'_> {
    /// Join the components back into the filename they were parsed from.
    #[must_use]
    pub fn to_filename(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.build)
    }
}

/// Split an artifact filename into `(name, version, build)`.
pub fn parse_artifact(filename: &str) -> Result<ArtifactParts<'_>, ParseError> {
    let mut parts = filename.rsplitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(build), Some(version), Some(name)) => Ok(ArtifactParts {
            name,
            version,
            build,
        }),
        _ => Err(ParseError {
            filename: filename.to_string(),
        }),
    }
}
