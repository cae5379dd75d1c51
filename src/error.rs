//! Fetch failure taxonomy.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// An error raised by [`Cache::fetch`](crate::Cache::fetch).
///
/// Every upstream-related failure classifies to a stable numeric code via
/// [`FetchError::code`]; local disk failures carry no code, only a
/// descriptive message.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream answered with a status other than 200.
    #[error("Upstream {url} failed: status code {}", .status.as_u16())]
    Status {
        /// The requested URL.
        url: String,
        /// The status upstream returned.
        status: StatusCode,
    },

    /// Upstream `Content-Type` is not in the configured allow-list.
    #[error("Upstream {url} failed: unsupported media-type {content_type}")]
    UnsupportedMediaType {
        /// The requested URL.
        url: String,
        /// The rejected `Content-Type` value.
        content_type: String,
    },

    /// Response headers did not arrive within the request deadline.
    #[error("Upstream {url} failed: request timeout of {}ms", .timeout.as_millis())]
    RequestTimeout {
        /// The requested URL.
        url: String,
        /// The configured request deadline.
        timeout: Duration,
    },

    /// The response body did not complete within the response deadline.
    #[error("Upstream {url} failed: response timeout of {}ms", .timeout.as_millis())]
    ResponseTimeout {
        /// The requested URL.
        url: String,
        /// The configured response deadline.
        timeout: Duration,
    },

    /// The request failed below the HTTP layer.
    #[error("Upstream {url} failed: {source}")]
    Transport {
        /// The requested URL.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Writing or finalizing the cache entry failed.
    #[error("failed to write cache entry `{}`: {source}", .path.display())]
    Disk {
        /// The entry (or its `.part` twin) that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// The numeric classification of this failure.
    ///
    /// Non-200 statuses pass through unchanged; a rejected media type is
    /// `415`; timeouts and refused connections are `504`; any other
    /// transport failure is `502`. Disk failures have no code.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(status.as_u16()),
            Self::UnsupportedMediaType { .. } => Some(415),
            Self::RequestTimeout { .. } | Self::ResponseTimeout { .. } => Some(504),
            Self::Transport { source, .. } => {
                if source.is_timeout() || source.is_connect() {
                    Some(504)
                } else {
                    Some(502)
                }
            }
            Self::Disk { .. } => None,
        }
    }
}
