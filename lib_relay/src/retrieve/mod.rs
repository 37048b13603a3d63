//! # Upstream Retrieval
//!
//! Production connection factories for the relay.
//!
//! ## Contained Modules:
//!
//! - **`sse_http`**: `HttpConnector`, a `reqwest` client that issues the GET and
//!   exposes the response body as an `AsyncRead`. It performs no retries of its
//!   own; reconnecting is the upstream loop's job.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// `reqwest`-backed connector for `text/event-stream` endpoints.
pub mod sse_http;

pub use sse_http::HttpConnector;
