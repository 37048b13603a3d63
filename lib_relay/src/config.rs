//! # Relay Options
//!
//! Runtime tunables shared by the `Distributor`, `UpstreamSource` and
//! `RelayLifecycle`. File/env/CLI layering lives in the binary; this is the
//! already-merged result.

use std::time::Duration;

/// Default delay between two connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Default header carrying the upstream credential.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "X-API-Key";
/// Default time allowed for in-flight work after a shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Tunables of a relay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Fixed wait in `RetryWait` before the next `Connecting` attempt.
    pub retry_delay: Duration,
    /// Bounded capacity of every subscriber queue. Zero is raised to one.
    pub queue_capacity: usize,
    /// Name of the header that carries the credential.
    pub credential_header: String,
    /// How long a shutdown waits for the upstream loop to unwind.
    pub shutdown_grace: Duration,
    /// Listen for Ctrl-C / SIGTERM once the relay is started.
    pub handle_signals: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            handle_signals: true,
        }
    }
}

impl RelayOptions {
    /// Sets the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the subscriber queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the credential header name.
    pub fn with_credential_header(mut self, header: impl Into<String>) -> Self {
        self.credential_header = header.into();
        self
    }

    /// Sets the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Enables or disables the OS signal listener.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Queue capacity as handed to `tokio::sync::mpsc::channel`, which rejects zero.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = RelayOptions::default();
        assert_eq!(opts.retry_delay, Duration::from_secs(5));
        assert_eq!(opts.queue_capacity, 256);
        assert_eq!(opts.credential_header, "X-API-Key");
        assert!(opts.handle_signals);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let opts = RelayOptions::default().with_queue_capacity(0);
        assert_eq!(opts.effective_queue_capacity(), 1);
    }
}
