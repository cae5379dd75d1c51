//! Streaming upstream fetches.
//!
//! The fetcher drives one upstream GET through its states: obtain and
//! validate headers under the request deadline, stream the body into the
//! entry's `.part` twin under the response deadline, then atomically
//! rename into place and stamp the entry's lifetime. Any failure
//! best-effort unlinks the twin before surfacing.

use std::path::Path;
use std::time::Duration;
use std::time::SystemTime;

use anyhow::Context as _;
use anyhow::Result;
use futures::StreamExt;
use http::StatusCode;
use http::header::CACHE_CONTROL;
use http::header::CONTENT_TYPE;
use reqwest::Client;
use reqwest::Response;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::io::BufWriter;
use tokio::time::timeout;
use tracing::debug;

use crate::error::FetchError;
use crate::key;
use crate::options::Options;
use crate::storage;
use crate::ttl;

/// Streams upstream responses into cache entries.
pub(crate) struct Fetcher {
    /// Shared HTTP client carrying the connect deadline and `User-Agent`.
    client: Client,
    /// Deadline for obtaining response headers.
    request_timeout: Duration,
    /// Deadline for the body, measured from header receipt; zero disables.
    response_timeout: Duration,
    /// Floor applied to the parsed `Cache-Control` lifetime.
    minimum_ttl: Duration,
    /// Allow-listed `Content-Type` values; empty allows anything.
    media_types: Vec<String>,
}

impl Fetcher {
    /// Builds the fetcher and its HTTP client from the cache options.
    pub(crate) fn new(options: &Options) -> Result<Self> {
        let client = Client::builder()
            .user_agent(options.user_agent.as_str())
            .connect_timeout(options.request_timeout)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            request_timeout: options.request_timeout,
            response_timeout: options.response_timeout,
            minimum_ttl: options.minimum_ttl,
            media_types: options.media_types.clone(),
        })
    }

    /// Fetches `url` into `entry`, returning the `(created, expires)`
    /// stamps of the new entry.
    pub(crate) async fn fetch(
        &self,
        url: &str,
        entry: &Path,
    ) -> Result<(SystemTime, SystemTime), FetchError> {
        let response = self.request(url).await?;
        let freshness = ttl::freshness_seconds(
            response
                .headers()
                .get(CACHE_CONTROL)
                .and_then(|value| value.to_str().ok()),
        );
        debug!(url, freshness, "streaming upstream response to disk");

        let part = key::part_path(entry);
        match self.materialize(url, response, entry, &part, freshness).await {
            Ok(stamps) => Ok(stamps),
            Err(err) => {
                fs::remove_file(&part).await.ok();
                Err(err)
            }
        }
    }

    /// Issues the GET and validates status and media type.
    ///
    /// Dropping the response on a validation failure aborts the request.
    async fn request(&self, url: &str) -> Result<Response, FetchError> {
        let response = match timeout(self.request_timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(FetchError::RequestTimeout {
                    url: url.to_string(),
                    timeout: self.request_timeout,
                });
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        if !self.media_types.is_empty() {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            if !self.media_types.iter().any(|allowed| allowed == content_type) {
                return Err(FetchError::UnsupportedMediaType {
                    url: url.to_string(),
                    content_type: content_type.to_string(),
                });
            }
        }

        Ok(response)
    }

    /// Streams the body into the `.part` twin, renames it into place and
    /// stamps the entry's lifetime.
    async fn materialize(
        &self,
        url: &str,
        response: Response,
        entry: &Path,
        part: &Path,
        freshness: u64,
    ) -> Result<(SystemTime, SystemTime), FetchError> {
        self.stream_body(url, response, part).await?;

        fs::rename(part, entry)
            .await
            .map_err(|source| FetchError::Disk {
                path: entry.to_path_buf(),
                source,
            })?;

        let ttl = self.minimum_ttl.max(Duration::from_secs(freshness));
        let created = SystemTime::now();
        let expires = created.checked_add(ttl).unwrap_or(created);
        if let Err(source) = storage::stamp(entry, created, expires) {
            // Without its stamps the entry would read as already stale;
            // remove it so a failed fetch leaves nothing behind.
            fs::remove_file(entry).await.ok();
            return Err(FetchError::Disk {
                path: entry.to_path_buf(),
                source,
            });
        }

        Ok((created, expires))
    }

    /// Drains the response body into the `.part` twin.
    ///
    /// The response deadline covers the whole drain, from header receipt
    /// to the final flush, and is disarmed by completion or error.
    async fn stream_body(
        &self,
        url: &str,
        response: Response,
        part: &Path,
    ) -> Result<(), FetchError> {
        let file = fs::File::create(part)
            .await
            .map_err(|source| FetchError::Disk {
                path: part.to_path_buf(),
                source,
            })?;
        let mut writer = BufWriter::new(file);

        let drain = async {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|source| FetchError::Transport {
                    url: url.to_string(),
                    source,
                })?;
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|source| FetchError::Disk {
                        path: part.to_path_buf(),
                        source,
                    })?;
            }
            writer.flush().await.map_err(|source| FetchError::Disk {
                path: part.to_path_buf(),
                source,
            })
        };

        if self.response_timeout.is_zero() {
            drain.await
        } else {
            match timeout(self.response_timeout, drain).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::ResponseTimeout {
                    url: url.to_string(),
                    timeout: self.response_timeout,
                }),
            }
        }
    }
}
