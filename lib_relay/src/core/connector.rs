//! # Connection Factory Seam
//!
//! The only thing the relay needs from its environment: open a GET request
//! against a URL with a set of headers and hand back the status and the body
//! as a byte stream. Production uses `retrieve::HttpConnector`; tests script
//! their own.

use std::future::Future;
use std::pin::Pin;

use http::HeaderMap;
use tokio::io::AsyncRead;

use crate::error::RelayError;

/// An open response body.
pub type UpstreamBody = Pin<Box<dyn AsyncRead + Send>>;

/// The response to one connection attempt.
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// The response body. Dropping it closes the connection.
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    /// Builds a response from any `AsyncRead`.
    pub fn new(status: u16, body: impl AsyncRead + Send + 'static) -> Self {
        Self {
            status,
            body: Box::pin(body),
        }
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens upstream connections.
///
/// An `Err` means no response was obtained at all. A response with any status
/// is `Ok`; deciding what a non-2xx status means is the caller's job.
pub trait Connector: Send + Sync + 'static {
    /// Issues one GET request.
    fn open(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> impl Future<Output = Result<UpstreamResponse, RelayError>> + Send;
}
