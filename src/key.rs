//! Mapping from fingerprints to on-disk cache locations.

use std::path::Path;
use std::path::PathBuf;

/// Calculates the shard directory for a fingerprint.
///
/// The first two characters of the fingerprint become a subdirectory of
/// the cache root, bounding the fan-out of any single directory.
pub(crate) fn shard_dir(root: &Path, fingerprint: &str) -> PathBuf {
    root.join(fingerprint.get(..2).unwrap_or(fingerprint))
}

/// Calculates the canonical path of a cache entry.
pub(crate) fn entry_path(root: &Path, fingerprint: &str) -> PathBuf {
    shard_dir(root, fingerprint).join(fingerprint)
}

/// Calculates the temporary twin of an entry.
///
/// The `.part` file must share a directory with the canonical name so
/// that the final rename is atomic.
pub(crate) fn part_path(entry: &Path) -> PathBuf {
    let mut name = entry.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
