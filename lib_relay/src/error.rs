//! # Relay Errors
//!
//! Every condition the relay can observe. Only `MissingCredential` and
//! `InvalidHeader` ever leave the crate (through `RelayLifecycle::ensure_started`);
//! everything else is logged and turned into a retry inside `UpstreamSource`.

use thiserror::Error;

/// Boxed transport error as returned by a `Connector`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors and recoverable conditions of the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No credential was configured. The relay must not connect without one.
    #[error("no upstream credential configured")]
    MissingCredential,

    /// The credential or its header name cannot be sent as an HTTP header.
    #[error("invalid upstream header: {0}")]
    InvalidHeader(String),

    /// The request never produced a response (DNS, TCP, TLS, bad URL...).
    #[error("connection to {url} failed: {source}")]
    Connection {
        /// The upstream URL that was being opened.
        url: String,
        /// The underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The upstream answered with a non-success status.
    #[error("upstream responded with status {0}")]
    Status(u16),

    /// The upstream closed the stream cleanly.
    #[error("upstream closed the stream")]
    StreamEnded,

    /// Reading from an open stream failed.
    #[error("reading the upstream stream failed: {0}")]
    Read(#[from] std::io::Error),
}

impl RelayError {
    /// `true` for conditions that abort startup instead of triggering a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::MissingCredential | RelayError::InvalidHeader(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(RelayError::MissingCredential.is_fatal());
        assert!(RelayError::InvalidHeader("x".into()).is_fatal());
        assert!(!RelayError::Status(503).is_fatal());
        assert!(!RelayError::StreamEnded.is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!RelayError::from(io).is_fatal());
    }

    #[test]
    fn connection_error_names_the_url() {
        let err = RelayError::Connection {
            url: "http://origin/stream".into(),
            source: "refused".into(),
        };
        assert_eq!(err.to_string(), "connection to http://origin/stream failed: refused");
    }
}
