//! Local artifact cache.
//!
//! Downloaded artifacts live at `<root>/<channel>/<package>/<subdir>/<filename>`.
//! The root is wiped at the start of every mirror run, so a cached file is only
//! ever reused within the run that downloaded it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::subdir::Subdir;

/// Suffix of a download still being written.
const PARTIAL_SUFFIX: &str = ".part";

/// Identifies one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub channel: String,
    pub package: String,
    pub subdir: Subdir,
    pub filename: String,
}

/// Artifact cache rooted at a local directory.
pub struct ArtifactCache {
    root: PathBuf,
    in_flight: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic local path of a cached artifact.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(&key.channel)
            .join(&key.package)
            .join(key.subdir.as_str())
            .join(&key.filename)
    }

    /// Path an in-progress download is written to before being renamed into place.
    #[must_use]
    pub fn partial_path_for(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.path_for(key).into_os_string();
        path.push(PARTIAL_SUFFIX);
        PathBuf::from(path)
    }

    /// Whether `key` is already present in the cache.
    pub async fn contains(&self, key: &CacheKey) -> io::Result<bool> {
        tokio::fs::try_exists(self.path_for(key)).await
    }

    /// Remove everything under the root and recreate it empty.
    pub async fn reset(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.root).await?;
        tracing::debug!(root = %self.root.display(), "Reset artifact cache");
        Ok(())
    }

    /// Acquire exclusive access to one cache key.
    ///
    /// Holders of different keys never wait on each other. The key's slot is
    /// dropped again once its last holder releases it.
    pub async fn lock(&self, key: &CacheKey) -> CacheLock<'_> {
        let slot = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        CacheLock {
            cache: self,
            key: key.clone(),
            slot,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Atomically store `bytes` as the cached artifact for `key`.
    pub async fn store(&self, key: &CacheKey, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(key);
        let partial = self.partial_path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        Ok(path)
    }
}

/// Exclusive access to one cache key, released on drop.
pub struct CacheLock<'a> {
    cache: &'a ArtifactCache,
    key: CacheKey,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CacheLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // Only the map and this lock still reference the slot: nobody is waiting.
        if Arc::strong_count(&self.slot) == 2
            && in_flight
                .get(&self.key)
                .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn key(filename: &str) -> CacheKey {
        CacheKey {
            channel: "src".to_string(),
            package: "foo".to_string(),
            subdir: Subdir::Noarch,
            filename: filename.to_string(),
        }
    }

    #[test]
    fn path_follows_channel_package_subdir_layout() {
        let cache = ArtifactCache::new("/cache");
        assert_eq!(
            cache.path_for(&key("foo-1.0-0.tar.bz2")),
            PathBuf::from("/cache/src/foo/noarch/foo-1.0-0.tar.bz2")
        );
        assert_eq!(
            cache.partial_path_for(&key("foo-1.0-0.tar.bz2")),
            PathBuf::from("/cache/src/foo/noarch/foo-1.0-0.tar.bz2.part")
        );
    }

    #[tokio::test]
    async fn store_then_contains() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache"));
        let key = key("foo-1.0-0.tar.bz2");

        assert!(!cache.contains(&key).await.unwrap());
        let path = cache.store(&key, b"artifact").await.unwrap();
        assert!(cache.contains(&key).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"artifact");
        assert!(!cache.partial_path_for(&key).exists());
    }

    #[tokio::test]
    async fn reset_clears_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache"));
        let key = key("foo-1.0-0.tar.bz2");
        cache.store(&key, b"stale").await.unwrap();

        cache.reset().await.unwrap();

        assert!(cache.root().is_dir());
        assert!(!cache.contains(&key).await.unwrap());
    }

    #[tokio::test]
    async fn reset_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("cache");
        let cache = ArtifactCache::new(&root);

        cache.reset().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn lock_serializes_same_key() {
        let cache = Arc::new(ArtifactCache::new("/unused"));
        let guard = cache.lock(&key("a-1-0.tar.bz2")).await;

        let contender = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let _guard = cache.lock(&key("a-1-0.tar.bz2")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(2), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
        assert_eq!(cache.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let cache = ArtifactCache::new("/unused");
        for name in ["a-1-0.tar.bz2", "b-1-0.tar.bz2", "a-1-0.tar.bz2"] {
            let guard = cache.lock(&key(name)).await;
            assert_eq!(cache.tracked_keys(), 1);
            drop(guard);
        }
        assert_eq!(cache.tracked_keys(), 0);

        let _held = cache.lock(&key("a-1-0.tar.bz2")).await;
        let other = cache.lock(&key("b-1-0.tar.bz2")).await;
        drop(other);
        assert_eq!(cache.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn lock_does_not_block_other_keys() {
        let cache = ArtifactCache::new("/unused");
        let _first = cache.lock(&key("a-1-0.tar.bz2")).await;
        tokio::time::timeout(Duration::from_secs(2), cache.lock(&key("b-1-0.tar.bz2")))
            .await
            .expect("different keys should not contend");
    }
}
