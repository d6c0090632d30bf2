//! Missing-artifact computation.
//!
//! Artifacts are compared by bare filename: destination filenames are unioned
//! across every requested subdirectory before the source listing is diffed
//! against them.

use std::collections::{BTreeSet, HashSet};

use crate::index::{IndexError, IndexFetcher};
use crate::subdir::Subdir;

/// An artifact present at the source but absent at the destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissingArtifact {
    /// Subdirectory the source lists the artifact under.
    pub subdir: Subdir,
    pub filename: String,
}

/// Artifacts of one package that the destination channel lacks.
///
/// A filename the source lists under several subdirectories appears once per
/// subdirectory. Iteration is ordered by subdirectory, then filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingSet {
    artifacts: BTreeSet<MissingArtifact>,
}

impl MissingSet {
    /// Diff a source listing against the destination's filenames.
    pub fn compute<'a, I>(source: I, destination: &HashSet<String>) -> Self
    where
        I: IntoIterator<Item = (Subdir, &'a str)>,
    {
        let artifacts = source
            .into_iter()
            .filter(|(_, filename)| !destination.contains(*filename))
            .map(|(subdir, filename)| MissingArtifact {
                subdir,
                filename: filename.to_string(),
            })
            .collect();
        Self { artifacts }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// True when `filename` is missing under any subdirectory.
    #[must_use]
    pub fn contains(&self, filename: &str) -> bool {
        self.artifacts.iter().any(|a| a.filename == filename)
    }

    /// The missing artifacts, ordered by subdirectory then filename.
    #[must_use]
    pub fn artifacts(&self) -> Vec<MissingArtifact> {
        self.artifacts.iter().cloned().collect()
    }
}

/// Compute the artifacts of `package` that `destination` is missing from `source`.
///
/// Index fetch failures abort the computation for this package and are returned
/// to the caller.
#[tracing::instrument(skip(fetcher, subdirs), fields(source = %source, destination = %destination, package = %package))]
pub async fn missing_artifacts<F>(
    fetcher: &F,
    source: &str,
    destination: &str,
    package: &str,
    subdirs: &[Subdir],
) -> Result<MissingSet, IndexError>
where
    F: IndexFetcher + ?Sized,
{
    let mut source_entries: Vec<(Subdir, String)> = Vec::new();
    let mut destination_filenames: HashSet<String> = HashSet::new();

    for &subdir in subdirs {
        let listed = fetcher.fetch_package_index(source, subdir, package).await?;
        source_entries.extend(listed.into_iter().map(|e| (subdir, e.filename)));

        let mirrored = fetcher
            .fetch_package_index(destination, subdir, package)
            .await?;
        destination_filenames.extend(mirrored.into_iter().map(|e| e.filename));
    }

    let missing = MissingSet::compute(
        source_entries.iter().map(|(s, f)| (*s, f.as_str())),
        &destination_filenames,
    );
    tracing::debug!(
        listed = source_entries.len(),
        mirrored = destination_filenames.len(),
        missing = missing.len(),
        "Computed missing artifacts"
    );
    Ok(missing)
}
