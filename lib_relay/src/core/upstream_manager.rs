//! # Upstream Source
//!
//! The retrying connection loop. It owns the one upstream connection, drives
//! the `FrameScanner` and decoder over each connection's body, and pushes every
//! decoded event into the `Distributor`.
//!
//! ## State machine
//!
//! ```text
//! Idle -> Connecting -> Streaming -> RetryWait -> Connecting -> ...
//!            \______________________/
//!               (failure / bad status)
//! any -> Cancelled (terminal)
//! ```
//!
//! A failed connect, a non-2xx status, a read error and a clean close are all
//! handled the same way: log, close, wait `retry_delay`, connect again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL};
use http::HeaderMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::RelayOptions;
use crate::core::connector::{Connector, UpstreamBody};
use crate::core::dispatcher::Distributor;
use crate::error::RelayError;
use crate::sse::{self, FrameScanner};

/// Content type requested from the upstream.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Operational states of the upstream loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Not started yet.
    Idle,
    /// A request is in flight.
    Connecting,
    /// A 2xx response is being scanned.
    Streaming,
    /// Waiting out the retry delay.
    RetryWait,
    /// The cancellation token fired. Terminal.
    Cancelled,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Idle => "idle",
            RelayState::Connecting => "connecting",
            RelayState::Streaming => "streaming",
            RelayState::RetryWait => "retry_wait",
            RelayState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How a single streaming session ended.
enum StreamOutcome {
    Cancelled,
    Ended(RelayError),
}

/// The connection loop for one upstream.
pub struct UpstreamSource<C> {
    connector: Arc<C>,
    distributor: Arc<Distributor>,
    url: String,
    headers: HeaderMap,
    retry_delay: Duration,
    state: watch::Sender<RelayState>,
    attempts: AtomicU64,
}

impl<C: Connector> UpstreamSource<C> {
    /// Creates an idle source.
    ///
    /// # Errors
    /// `MissingCredential` when `credential` is blank, `InvalidHeader` when the
    /// credential or the configured header name is not a legal header.
    pub fn new(
        connector: Arc<C>,
        distributor: Arc<Distributor>,
        url: impl Into<String>,
        credential: &str,
        options: &RelayOptions,
    ) -> Result<Self, RelayError> {
        let headers = build_headers(&options.credential_header, credential)?;
        let (state, _) = watch::channel(RelayState::Idle);
        Ok(Self {
            connector,
            distributor,
            url: url.into(),
            headers,
            retry_delay: options.retry_delay,
            state,
            attempts: AtomicU64::new(0),
        })
    }

    /// Current state.
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// The upstream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn set_state(&self, next: RelayState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Upstream state change");
        }
    }

    /// # Main Connection Loop
    ///
    /// Runs until `cancel` fires. Cancellation is checked before every attempt
    /// and raced against the connect, every read and the retry sleep, so the
    /// loop unwinds promptly from any state.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(url = %self.url, retry_delay_ms = self.retry_delay.as_millis() as u64, "Upstream source started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(RelayState::Connecting);
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(attempt, url = %self.url, "Connecting to upstream");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                opened = self.connector.open(&self.url, &self.headers) => opened,
            };

            match opened {
                Ok(response) if response.is_success() => {
                    tracing::info!(attempt, status = response.status, "Upstream connected, streaming");
                    self.set_state(RelayState::Streaming);
                    match self.stream(response.body, &cancel).await {
                        StreamOutcome::Cancelled => break,
                        StreamOutcome::Ended(reason) => {
                            tracing::warn!(attempt, "Upstream stream ended: {}", reason);
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status;
                    drop(response);
                    tracing::error!(attempt, status, "Upstream rejected connection: {}", RelayError::Status(status));
                }
                Err(e) => {
                    tracing::error!(attempt, "Upstream connection failed: {}", e);
                }
            }

            self.set_state(RelayState::RetryWait);
            tracing::info!(delay_ms = self.retry_delay.as_millis() as u64, "Waiting before reconnecting");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        self.set_state(RelayState::Cancelled);
        tracing::info!(attempts = self.attempts(), "Upstream source cancelled");
    }

    /// Scans one connection's body until it ends or `cancel` fires.
    async fn stream(&self, body: UpstreamBody, cancel: &CancellationToken) -> StreamOutcome {
        let mut scanner = FrameScanner::new(body);
        let mut relayed: u64 = 0;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamOutcome::Cancelled,
                next = scanner.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => {
                    // Frames without payload are expected (keepalives) and dropped silently.
                    if let Some(event) = sse::decode(frame) {
                        tracing::trace!(kind = event.kind(), bytes = event.payload().len(), "Relaying event");
                        self.distributor.broadcast(event.to_wire());
                        relayed += 1;
                    }
                }
                Ok(None) => break StreamOutcome::Ended(RelayError::StreamEnded),
                Err(e) => break StreamOutcome::Ended(RelayError::Read(e)),
            }
        };

        // Release the connection now rather than when the loop iteration ends.
        drop(scanner);
        tracing::info!(relayed, "Upstream connection closed");
        outcome
    }
}

/// Builds the per-attempt request headers.
fn build_headers(header_name: &str, credential: &str) -> Result<HeaderMap, RelayError> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(RelayError::MissingCredential);
    }

    let name = HeaderName::from_bytes(header_name.as_bytes())
        .map_err(|e| RelayError::InvalidHeader(format!("{header_name}: {e}")))?;
    let mut value = HeaderValue::from_str(credential)
        .map_err(|e| RelayError::InvalidHeader(format!("{header_name} value: {e}")))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(name, value);
    Ok(headers)
}
