//! Implementation of the cache orchestrator.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context as _;
use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::key;
use crate::lock::PathLocker;
use crate::options::Options;
use crate::storage;
use crate::storage::Probe;
use crate::sweep;

/// Name of the scratch file used to verify write access at construction.
const ACCESS_PROBE: &str = ".petra-access";

/// A successfully resolved cache entry.
#[derive(Debug, Clone)]
pub struct CachedFile {
    /// Location of the response body on disk.
    pub path: PathBuf,
    /// Instant the entry was cached.
    pub created: SystemTime,
    /// Instant the entry becomes stale.
    pub expires: SystemTime,
}

/// An embeddable, filesystem-backed reverse HTTP cache.
///
/// Cloning is cheap; clones share the cache directory, the single-flight
/// lock table and the HTTP client. The background stale sweeper stops
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Cache {
    /// Shared state behind the cheap clones.
    inner: Arc<Inner>,
}

/// State shared by all clones of a [`Cache`].
struct Inner {
    /// The configuration the cache was built with.
    options: Options,
    /// Single-flight coordination keyed by entry path.
    locker: Arc<PathLocker>,
    /// The upstream fetch driver.
    fetcher: Fetcher,
    /// The background stale sweeper.
    sweeper: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

impl Cache {
    /// Constructs a cache from the given options.
    ///
    /// Creates the cache directory (tolerating existence), verifies it is
    /// readable and writable, and schedules the background stale sweep.
    /// This is the only fallible setup point; per-fetch failures are
    /// reported by [`Cache::fetch`].
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime, which the sweeper task
    /// is spawned onto.
    pub fn new(options: Options) -> Result<Self> {
        fs::create_dir_all(&options.cache_directory).with_context(|| {
            format!(
                "failed to create cache directory `{dir}`",
                dir = options.cache_directory.display()
            )
        })?;
        verify_access(&options.cache_directory)?;

        let fetcher = Fetcher::new(&options)?;
        let locker = Arc::new(PathLocker::default());
        let sweeper = sweep::spawn_sweeper(
            options.cache_directory.clone(),
            options.purge_stale_interval,
            Arc::clone(&locker),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                locker,
                fetcher,
                sweeper,
            }),
        })
    }

    /// The root of the on-disk cache.
    pub fn cache_directory(&self) -> &Path {
        &self.inner.options.cache_directory
    }

    /// Resolves `url` to a local file containing its response body.
    ///
    /// On a hit the entry is served straight from disk. On a miss the
    /// body is fetched from upstream, streamed to disk and stamped with
    /// its expiry before the path is returned. Concurrent fetches of the
    /// same URL collapse into a single upstream request; waiters observe
    /// the freshly materialized entry as a hit.
    pub async fn fetch(&self, url: &str) -> Result<CachedFile, FetchError> {
        let fingerprint = (self.inner.options.hash)(url);
        let shard = key::shard_dir(&self.inner.options.cache_directory, &fingerprint);
        let entry = key::entry_path(&self.inner.options.cache_directory, &fingerprint);

        // Held across both the probe and any upstream materialization.
        let _guard = self.inner.locker.acquire(entry.clone()).await;

        match storage::probe(&shard, &entry).await {
            Probe::Hit { created, expires } => {
                debug!(url, fingerprint, "cache hit");
                Ok(CachedFile {
                    path: entry,
                    created,
                    expires,
                })
            }
            Probe::Miss => {
                debug!(url, fingerprint, "cache miss");
                let (created, expires) = self.inner.fetcher.fetch(url, &entry).await?;
                Ok(CachedFile {
                    path: entry,
                    created,
                    expires,
                })
            }
        }
    }

    /// Removes the cached entry for `url`, if any.
    ///
    /// Never fails observably; purging an absent entry is a silent
    /// success.
    pub async fn purge(&self, url: &str) {
        let fingerprint = (self.inner.options.hash)(url);
        let entry = key::entry_path(&self.inner.options.cache_directory, &fingerprint);

        let _guard = self.inner.locker.acquire(entry.clone()).await;

        match tokio::fs::remove_file(&entry).await {
            Ok(()) => debug!(url, fingerprint, "purged cache entry"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                debug!(url, fingerprint, error = %err, "failed to purge cache entry");
            }
        }
    }
}

/// Verifies the cache directory is usable before any entry is written.
fn verify_access(dir: &Path) -> Result<()> {
    fs::read_dir(dir).with_context(|| {
        format!(
            "cache directory `{dir}` is not readable",
            dir = dir.display()
        )
    })?;

    let probe = dir.join(ACCESS_PROBE);
    fs::write(&probe, b"").with_context(|| {
        format!(
            "cache directory `{dir}` is not writable",
            dir = dir.display()
        )
    })?;
    fs::remove_file(&probe).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn construction_creates_the_cache_directory() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("nested").join("petra");
        let cache = Cache::new(Options {
            cache_directory: dir.clone(),
            ..Options::default()
        })
        .unwrap();

        assert!(dir.is_dir());
        assert_eq!(cache.cache_directory(), dir);
        assert!(
            !dir.join(ACCESS_PROBE).exists(),
            "the access probe file is cleaned up"
        );
    }

    #[tokio::test]
    async fn construction_fails_when_the_path_is_a_file() {
        let root = TempDir::new().unwrap();
        let occupied = root.path().join("occupied");
        fs::write(&occupied, b"not a directory").unwrap();

        let result = Cache::new(Options {
            cache_directory: occupied,
            ..Options::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn purge_of_an_absent_entry_is_silent() {
        let root = TempDir::new().unwrap();
        let cache = Cache::new(Options {
            cache_directory: root.path().join("cache"),
            ..Options::default()
        })
        .unwrap();

        cache.purge("http://upstream/never-fetched").await;
        cache.purge("http://upstream/never-fetched").await;
    }
}
