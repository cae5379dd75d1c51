//! On-disk cache entry lifecycle.
//!
//! An entry is a plain file named by its fingerprint under a
//! two-character shard directory. Its access time records when the entry
//! was created and its modification time records when it becomes stale;
//! there is no sidecar metadata.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use tokio::fs;
use tracing::debug;
use tracing::warn;

/// Outcome of probing the cache for an entry.
pub(crate) enum Probe {
    /// A fresh entry exists.
    Hit {
        /// Instant the entry was created (its atime).
        created: SystemTime,
        /// Instant the entry becomes stale (its mtime).
        expires: SystemTime,
    },
    /// No usable entry; the shard directory is ready for a fetch.
    Miss,
}

/// Decides hit or miss from file metadata.
///
/// An entry is a hit iff it exists, is a regular file, has a positive
/// size and its mtime lies strictly in the future. A stale file is
/// reported as a miss and left in place for the sweeper. Stat errors
/// other than absence are logged and reported as a miss: the upstream
/// fetch that follows will produce a more actionable error if the path
/// is truly unusable.
pub(crate) async fn probe(shard_dir: &Path, entry: &Path) -> Probe {
    match fs::metadata(entry).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Err(err) = fs::create_dir_all(shard_dir).await {
                warn!(
                    dir = %shard_dir.display(),
                    error = %err,
                    "failed to prepare cache shard directory"
                );
            }
            Probe::Miss
        }
        Err(err) => {
            warn!(entry = %entry.display(), error = %err, "cache probe failed");
            Probe::Miss
        }
        Ok(meta) => {
            let now = SystemTime::now();
            match meta.modified() {
                Ok(expires) if meta.is_file() && meta.len() > 0 && expires > now => Probe::Hit {
                    created: meta.accessed().unwrap_or(now),
                    expires,
                },
                _ => {
                    debug!(entry = %entry.display(), "cache entry empty, expired or not a file");
                    Probe::Miss
                }
            }
        }
    }
}

/// Stamps an entry's lifetime: atime is the creation instant, mtime the
/// expiry instant.
pub(crate) fn stamp(entry: &Path, created: SystemTime, expires: SystemTime) -> io::Result<()> {
    filetime::set_file_times(
        entry,
        FileTime::from_system_time(created),
        FileTime::from_system_time(expires),
    )
}
