//! Cache configuration.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::Digest;
use sha2::Sha256;

/// The default `User-Agent` sent with upstream requests.
pub const DEFAULT_USER_AGENT: &str = "lovell/petra";

/// An injected fingerprint function mapping a URL to a cache key.
///
/// The returned string becomes the on-disk file name of the entry, so it
/// must be stable for a given URL and safe to use as a file name. The
/// default produces a 64-character lowercase hex SHA-256 digest.
pub type HashFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options for constructing a [`Cache`](crate::Cache).
///
/// All fields have defaults; construct with struct update syntax:
///
/// ```
/// use std::time::Duration;
///
/// let options = petra::Options {
///     minimum_ttl: Duration::from_secs(60),
///     ..petra::Options::default()
/// };
/// ```
#[derive(Clone)]
pub struct Options {
    /// Root of the on-disk cache.
    ///
    /// Must be readable and writable at construction.
    pub cache_directory: PathBuf,

    /// Floor on entry expiry; the effective TTL of an entry is the larger
    /// of this and the lifetime parsed from the upstream `Cache-Control`.
    pub minimum_ttl: Duration,

    /// Period of the background stale sweep.
    pub purge_stale_interval: Duration,

    /// Allow-list of upstream `Content-Type` values; empty means no
    /// filtering.
    pub media_types: Vec<String>,

    /// Deadline to obtain response headers from upstream.
    pub request_timeout: Duration,

    /// Deadline, measured from header receipt, for the response body to
    /// complete; zero disables.
    pub response_timeout: Duration,

    /// `User-Agent` sent upstream.
    pub user_agent: String,

    /// Fingerprint function; the URL is hashed verbatim, with no
    /// normalization.
    pub hash: HashFn,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache_directory: env::temp_dir().join("petra"),
            minimum_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            purge_stale_interval: Duration::from_secs(60 * 60),
            media_types: Vec::new(),
            request_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            hash: Arc::new(sha256_hex),
        }
    }
}

/// The default fingerprint: lowercase hex SHA-256 of the verbatim URL.
fn sha256_hex(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fingerprint_is_hex_sha256() {
        let fingerprint = sha256_hex("https://example.com/image.png");
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(!fingerprint.bytes().any(|b| b.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = sha256_hex("https://example.com/a");
        let b = sha256_hex("https://example.com/a");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_urls_have_distinct_fingerprints() {
        // No normalization: trailing slashes and query order are significant.
        let a = sha256_hex("https://example.com/a");
        let b = sha256_hex("https://example.com/a/");
        assert_ne!(a, b);
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = Options::default();
        assert_eq!(options.minimum_ttl, Duration::from_secs(604_800));
        assert_eq!(options.purge_stale_interval, Duration::from_secs(3_600));
        assert_eq!(options.request_timeout, Duration::from_secs(10));
        assert_eq!(options.response_timeout, Duration::from_secs(10));
        assert_eq!(options.user_agent, "lovell/petra");
        assert!(options.media_types.is_empty());
        assert!(options.cache_directory.ends_with("petra"));
    }
}
