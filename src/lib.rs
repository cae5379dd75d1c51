//! An embeddable, filesystem-backed reverse HTTP cache.
//!
//! [`Cache::fetch`] resolves a remote URL to a local file containing its
//! response body, together with the instants the entry was cached and
//! will expire. Misses are fetched from upstream and streamed to disk,
//! keyed by a fingerprint of the URL; the upstream `Cache-Control`
//! header drives expiry, bounded below by a configured minimum TTL.
//!
//! Key properties:
//!
//! * Concurrent fetches of the same URL collapse into a single upstream
//!   request (single-flight), so a cold popular entry cannot stampede
//!   the origin.
//! * Entries appear atomically: bodies are streamed to a `.part` sibling
//!   and renamed into place only once complete, so a reader never sees a
//!   partial body under the canonical name.
//! * Expiry is encoded in the file's own modification time; there is no
//!   sidecar metadata and no in-memory body cache. The filesystem is the
//!   cache.
//! * A background task periodically sweeps entries that have been stale
//!   for more than a day.
//!
//! Coordination is process-local; run one cache per directory per
//! process.
//!
//! ```no_run
//! use petra::Cache;
//! use petra::Options;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let cache = Cache::new(Options::default())?;
//!
//! let entry = cache.fetch("https://example.com/logo.png").await?;
//! println!(
//!     "body at {path}, fresh until {expires:?}",
//!     path = entry.path.display(),
//!     expires = entry.expires,
//! );
//!
//! cache.purge("https://example.com/logo.png").await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

mod cache;
mod error;
mod fetcher;
mod key;
mod lock;
mod options;
mod storage;
mod sweep;
mod ttl;

pub use cache::Cache;
pub use cache::CachedFile;
pub use error::FetchError;
pub use options::DEFAULT_USER_AGENT;
pub use options::HashFn;
pub use options::Options;
// Re-export the http crate.
pub use http;
