//! # lib_relay
//!
//! The live-event relay at the heart of ReStream. One upstream
//! `text/event-stream` connection is kept alive, its frames are decoded, and
//! every decoded event is fanned out to a changing set of subscriber queues.
//! A subscriber that cannot keep up loses messages; it never slows anyone else
//! down.
//!
//! ## Layout
//!
//! - **`sse`**: line scanning and frame decoding for the upstream wire format.
//! - **`core`**: the `Distributor`, the retrying `UpstreamSource` loop and the
//!   `RelayLifecycle` that owns both.
//! - **`retrieve`** (feature `retrieve`): the `reqwest`-backed connection factory.
//! - **`loggers`** (feature `loggers`): `tracing` subscriber setup.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod core;
pub mod error;
pub mod sse;

#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "retrieve")]
pub mod retrieve;

pub use config::RelayOptions;
pub use core::{
    Connector, Distributor, DistributorStats, RelayLifecycle, RelayState, SubscriberQueue,
    UpstreamBody, UpstreamResponse, UpstreamSource,
};
pub use error::RelayError;
pub use sse::{DecodedEvent, FrameScanner, RawFrame};

#[cfg(feature = "retrieve")]
pub use retrieve::HttpConnector;
