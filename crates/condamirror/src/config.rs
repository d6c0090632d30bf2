//! Mirror document loading and validation.
//!
//! The mirror document is a YAML list of entries:
//!
//! ```yaml
//! - source: andfoy
//!   destination: Semi-ATE
//!   token: ${SEMI_ATE_TOKEN}
//!   packages: [pyqt, pyqt-impl]
//!   subdirs: [noarch, linux-64]
//! ```
//!
//! A document holding a single mapping is read as a one-entry list, which
//! also covers the older `source_channel` / `destination_channel` /
//! `packages_to_mirror` layout.
//!
//! Every entry is validated before anything touches the network, and all
//! problems are reported together.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::subdir::Subdir;
use crate::upload::Token;

/// Default file name of the mirror document.
pub const DEFAULT_MIRROR_FILE: &str = "mirror.yaml";

/// A field that accepts either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// An entry as written in the mirror document, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawMirrorEntry {
    #[serde(default, alias = "source_channel")]
    pub source: Option<String>,
    #[serde(default, alias = "destination_channel")]
    pub destination: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "packages_to_mirror")]
    pub packages: Option<OneOrMany>,
    #[serde(default)]
    pub subdirs: Option<OneOrMany>,
}

/// A validated mirror entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub source: String,
    pub destination: String,
    pub token: Token,
    /// Package names, in document order without duplicates.
    pub packages: Vec<String>,
    /// Subdirectories to mirror, sorted without duplicates.
    pub subdirs: Vec<Subdir>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read mirror document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mirror document: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error("mirror document has no entries")]
    NoEntries,

    #[error("entry {entry}: missing required field '{field}'")]
    MissingField { entry: usize, field: &'static str },

    #[error("entry {entry}: '{field}' must not be empty")]
    EmptyField { entry: usize, field: &'static str },

    #[error("entry {entry}: '{value}' is not a valid {field} name")]
    InvalidName {
        entry: usize,
        field: &'static str,
        value: String,
    },

    #[error("entry {entry}: {source}")]
    UnsupportedSubdir {
        entry: usize,
        #[source]
        source: crate::subdir::UnsupportedSubdir,
    },

    #[error("entry {entry}: token placeholder ${{{name}}} is not set")]
    UnresolvedToken { entry: usize, name: String },

    #[error("{}", describe_problems(.0))]
    Invalid(Vec<ConfigError>),
}

impl ConfigError {
    /// Collapse a list of problems into one error.
    fn from_problems(mut problems: Vec<ConfigError>) -> Self {
        if problems.len() == 1 {
            problems.remove(0)
        } else {
            ConfigError::Invalid(problems)
        }
    }

    /// Individual problems, flattening [`ConfigError::Invalid`].
    #[must_use]
    pub fn problems(&self) -> Vec<&ConfigError> {
        match self {
            ConfigError::Invalid(problems) => problems.iter().collect(),
            other => vec![other],
        }
    }
}

fn describe_problems(problems: &[ConfigError]) -> String {
    let mut out = format!("{} problems in mirror document:", problems.len());
    for problem in problems {
        out.push_str("\n  - ");
        out.push_str(&problem.to_string());
    }
    out
}

/// Top level of a mirror document.
#[derive(Deserialize)]
#[serde(untagged)]
enum MirrorDocument {
    Entries(Vec<RawMirrorEntry>),
    Single(RawMirrorEntry),
}

/// Parse a mirror document into raw entries.
pub fn parse_mirror_document(document: &str) -> Result<Vec<RawMirrorEntry>, ConfigError> {
    if document.trim().is_empty() {
        return Err(ConfigError::NoEntries);
    }
    let parsed: Option<MirrorDocument> = serde_yaml_ng::from_str(document)?;
    match parsed {
        Some(MirrorDocument::Entries(entries)) if !entries.is_empty() => Ok(entries),
        Some(MirrorDocument::Single(entry)) => Ok(vec![entry]),
        _ => Err(ConfigError::NoEntries),
    }
}

/// Validate raw entries, resolving `${NAME}` token placeholders through `lookup`.
///
/// Entries are numbered from 1 in error messages.
pub fn resolve_entries<F>(
    raw: Vec<RawMirrorEntry>,
    lookup: F,
) -> Result<Vec<MirrorEntry>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();
    let mut entries = Vec::with_capacity(raw.len());

    for (idx, raw) in raw.into_iter().enumerate() {
        match resolve_entry(idx + 1, raw, &lookup) {
            Ok(entry) => entries.push(entry),
            Err(mut errs) => problems.append(&mut errs),
        }
    }

    if problems.is_empty() {
        Ok(entries)
    } else {
        Err(ConfigError::from_problems(problems))
    }
}

/// Read, parse and validate a mirror document from disk.
pub fn load_mirror_file<F>(path: &Path, lookup: F) -> Result<Vec<MirrorEntry>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = parse_mirror_document(&document)?;
    resolve_entries(raw, lookup)
}

fn resolve_entry<F>(
    entry: usize,
    raw: RawMirrorEntry,
    lookup: &F,
) -> Result<MirrorEntry, Vec<ConfigError>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();

    let source = required_name(entry, "source", raw.source, &mut problems);
    let destination = required_name(entry, "destination", raw.destination, &mut problems);

    let token = match raw.token {
        None => {
            problems.push(ConfigError::MissingField {
                entry,
                field: "token",
            });
            None
        }
        Some(value) => match resolve_token(entry, &value, lookup) {
            Ok(token) => Some(token),
            Err(e) => {
                problems.push(e);
                None
            }
        },
    };

    let mut packages: Vec<String> = Vec::new();
    match raw.packages.map(OneOrMany::into_vec) {
        None => problems.push(ConfigError::MissingField {
            entry,
            field: "packages",
        }),
        Some(values) if values.is_empty() => problems.push(ConfigError::EmptyField {
            entry,
            field: "packages",
        }),
        Some(values) => {
            for value in values {
                let value = value.trim().to_string();
                if !is_plain_name(&value) {
                    problems.push(ConfigError::InvalidName {
                        entry,
                        field: "package",
                        value,
                    });
                } else if !packages.contains(&value) {
                    packages.push(value);
                }
            }
        }
    }

    let mut subdirs: Vec<Subdir> = match raw.subdirs.map(OneOrMany::into_vec) {
        None => Subdir::ALL.to_vec(),
        Some(values) => values
            .iter()
            .filter_map(|value| match value.trim().parse::<Subdir>() {
                Ok(subdir) => Some(subdir),
                Err(source) => {
                    problems.push(ConfigError::UnsupportedSubdir { entry, source });
                    None
                }
            })
            .collect(),
    };
    subdirs.sort();
    subdirs.dedup();
    if subdirs.is_empty() && problems.is_empty() {
        problems.push(ConfigError::EmptyField {
            entry,
            field: "subdirs",
        });
    }

    match (source, destination, token) {
        (Some(source), Some(destination), Some(token)) if problems.is_empty() => Ok(MirrorEntry {
            source,
            destination,
            token,
            packages,
            subdirs,
        }),
        _ => Err(problems),
    }
}

fn required_name(
    entry: usize,
    field: &'static str,
    value: Option<String>,
    problems: &mut Vec<ConfigError>,
) -> Option<String> {
    let Some(value) = value else {
        problems.push(ConfigError::MissingField { entry, field });
        return None;
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        problems.push(ConfigError::EmptyField { entry, field });
        return None;
    }
    if !is_plain_name(&value) {
        problems.push(ConfigError::InvalidName {
            entry,
            field,
            value,
        });
        return None;
    }
    Some(value)
}

fn resolve_token<F>(entry: usize, value: &str, lookup: &F) -> Result<Token, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = value.trim();
    let secret = match placeholder_name(value) {
        Some(name) => lookup(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::UnresolvedToken {
                entry,
                name: name.to_string(),
            })?,
        None => value.to_string(),
    };
    if secret.is_empty() {
        return Err(ConfigError::EmptyField {
            entry,
            field: "token",
        });
    }
    Ok(Token::new(secret))
}

/// The variable name of a `${NAME}` placeholder.
fn placeholder_name(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Channel and package names become path components of the cache.
fn is_plain_name(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".." && !value.contains(['/', '\\'])
}
