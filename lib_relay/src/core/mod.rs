//! # Core Relay Engine
//!
//! Everything between the upstream socket and the subscriber queues.
//!
//! ## Core Components:
//!
//! - **`connector`**: the connection-factory trait the relay is generic over.
//! - **`dispatcher`**: the `Distributor`, a lossy zero-copy fan-out over bounded
//!   per-subscriber queues.
//! - **`upstream_manager`**: the `UpstreamSource` retry loop and its `RelayState`
//!   state machine.
//! - **`lifecycle`**: the `RelayLifecycle` that starts the loop exactly once and
//!   shuts everything down on `stop` or on a process signal.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The connection-factory seam.
pub mod connector;
/// Lossy fan-out to subscriber queues.
pub mod dispatcher;
/// One-shot start, stop and signal handling.
pub mod lifecycle;
/// The retrying upstream connection loop.
pub mod upstream_manager;

// --- Public API Re-exports ---
pub use connector::{Connector, UpstreamBody, UpstreamResponse};
pub use dispatcher::{Distributor, DistributorStats, SubscriberQueue};
pub use lifecycle::{shutdown_signal, RelayLifecycle};
pub use upstream_manager::{RelayState, UpstreamSource, EVENT_STREAM};
