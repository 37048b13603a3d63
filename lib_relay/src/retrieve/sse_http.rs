//! # HTTP Event-Stream Connector
//!
//! Opens the upstream with a plain `reqwest::Client`. The body is never
//! buffered: `bytes_stream()` is adapted into an `AsyncRead` with
//! `tokio_util::io::StreamReader` so the line scanner pulls chunks as they
//! arrive.

use std::io;

use futures_util::TryStreamExt;
use http::HeaderMap;
use tokio_util::io::StreamReader;

use crate::core::connector::{Connector, UpstreamResponse};
use crate::error::RelayError;

/// Connection factory backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    inner: reqwest::Client,
}

impl HttpConnector {
    /// Creates a connector with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing client, e.g. one with a custom connect timeout or proxy.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }
}

impl Connector for HttpConnector {
    async fn open(&self, url: &str, headers: &HeaderMap) -> Result<UpstreamResponse, RelayError> {
        let response = self
            .inner
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| RelayError::Connection {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let status = response.status().as_u16();
        tracing::debug!(url, status, "Upstream responded");

        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(UpstreamResponse::new(status, StreamReader::new(body)))
    }
}
