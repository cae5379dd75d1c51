//! Periodic removal of long-stale cache entries.

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use tokio::fs;
use tokio::task::JoinHandle;
use tracing::trace;
use tracing::warn;

use crate::lock::PathLocker;

/// Files whose mtime lies at least this far in the past are removed.
///
/// The mtime of an entry is its expiry instant, so anything a day old
/// has been stale for at least a day. The probe already treats fresher
/// stale entries as misses, so the grace window is invisible to readers.
const STALE_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Spawns the periodic sweep over the cache root.
pub(crate) fn spawn_sweeper(
    root: PathBuf,
    interval: Duration,
    locker: Arc<PathLocker>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = sweep(&root, &locker).await {
                warn!(error = %err, "cache sweep failed");
            }
        }
    })
}

/// One pass: unlinks regular files whose mtime is older than the grace
/// cutoff, walking root-level files and one shard level deep.
///
/// Foreign file names are swept on the same terms as entries; vanished
/// directories are tolerated.
async fn sweep(root: &Path, locker: &Arc<PathLocker>) -> io::Result<()> {
    let cutoff = SystemTime::now() - STALE_GRACE;

    let mut top = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    while let Some(entry) = top.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_file() {
            remove_if_stale(entry.path(), cutoff, locker).await;
        } else if file_type.is_dir() {
            let mut shard = match fs::read_dir(entry.path()).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            while let Some(entry) = shard.next_entry().await? {
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_file() {
                    remove_if_stale(entry.path(), cutoff, locker).await;
                }
            }
        }
    }

    Ok(())
}

/// Unlinks `path` under its lock if its mtime precedes `cutoff`.
async fn remove_if_stale(path: PathBuf, cutoff: SystemTime, locker: &Arc<PathLocker>) {
    let stale = fs::metadata(&path)
        .await
        .ok()
        .and_then(|meta| meta.modified().ok())
        .is_some_and(|mtime| mtime < cutoff);
    if !stale {
        return;
    }

    let _guard = locker.acquire(path.clone()).await;
    trace!(path = %path.display(), "removing stale cache entry");
    fs::remove_file(&path).await.ok();
}
