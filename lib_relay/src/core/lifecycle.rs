//! # Relay Lifecycle
//!
//! Owns one `Distributor`, at most one `UpstreamSource` and the cancellation
//! token that unwinds both. A single instance is created at startup and shared
//! by `Arc` with whoever needs the relay; nothing is looked up globally.
//!
//! ## Guarantees
//! - `ensure_started` launches the upstream loop exactly once, however many
//!   callers race on it (`tokio::sync::OnceCell`). A failed start (missing
//!   credential) leaves the guard unset so a corrected call can still succeed.
//! - `stop` fires the token and closes every subscriber queue.
//! - With `handle_signals` on, Ctrl-C / SIGTERM does the same and then waits at
//!   most `shutdown_grace` for the upstream loop to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::{mpsc, watch, OnceCell};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::RelayOptions;
use crate::core::connector::Connector;
use crate::core::dispatcher::{Distributor, DistributorStats, SubscriberQueue};
use crate::core::upstream_manager::{RelayState, UpstreamSource};
use crate::error::RelayError;

/// The process-wide relay.
pub struct RelayLifecycle<C: Connector> {
    connector: Arc<C>,
    distributor: Arc<Distributor>,
    options: RelayOptions,
    cancel: CancellationToken,
    tracker: TaskTracker,
    source: OnceCell<Arc<UpstreamSource<C>>>,
}

impl<C: Connector> RelayLifecycle<C> {
    /// Creates a relay with its own cancellation token.
    pub fn new(connector: C, options: RelayOptions) -> Self {
        Self::with_token(connector, options, CancellationToken::new())
    }

    /// Creates a relay bound to an externally owned token. Cancelling that
    /// token from outside shuts the relay down exactly like `stop`.
    pub fn with_token(connector: C, options: RelayOptions, cancel: CancellationToken) -> Self {
        let distributor = Arc::new(Distributor::new(options.effective_queue_capacity()));
        Self {
            connector: Arc::new(connector),
            distributor,
            options,
            cancel,
            tracker: TaskTracker::new(),
            source: OnceCell::new(),
        }
    }

    /// # Ensure Streaming
    ///
    /// Starts the upstream loop on first successful call; every later call is a
    /// no-op. Once the relay has been cancelled nothing is started any more.
    ///
    /// # Errors
    /// `MissingCredential` / `InvalidHeader`. Both are fatal configuration
    /// errors; connection problems are never reported here.
    pub async fn ensure_started(&self, url: &str, credential: &str) -> Result<(), RelayError> {
        if self.cancel.is_cancelled() {
            tracing::warn!("Relay already cancelled, not starting upstream");
            return Ok(());
        }
        self.source
            .get_or_try_init(|| async { self.launch(url, credential) })
            .await?;
        Ok(())
    }

    fn launch(&self, url: &str, credential: &str) -> Result<Arc<UpstreamSource<C>>, RelayError> {
        let source = Arc::new(UpstreamSource::new(
            Arc::clone(&self.connector),
            Arc::clone(&self.distributor),
            url,
            credential,
            &self.options,
        )?);

        let task_source = Arc::clone(&source);
        let token = self.cancel.clone();
        self.tracker.spawn(async move { task_source.run(token).await });
        self.tracker.close();

        if self.options.handle_signals {
            self.spawn_signal_listener();
        }

        tracing::info!(url, "Relay started");
        Ok(source)
    }

    fn spawn_signal_listener(&self) {
        let cancel = self.cancel.clone();
        let distributor = Arc::clone(&self.distributor);
        let tracker = self.tracker.clone();
        let grace = self.options.shutdown_grace;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = shutdown_signal() => {}
            }
            tracing::warn!("Shutdown signal received, stopping relay");
            cancel.cancel();
            distributor.stop();
            drain(&tracker, grace).await;
        });
    }

    /// Fires the token and closes every subscriber queue. Does not wait.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Stopping relay");
        }
        self.cancel.cancel();
        self.distributor.stop();
    }

    /// `stop`, then wait up to the grace period for the upstream loop.
    /// Returns `false` if the grace period ran out.
    pub async fn shutdown(&self) -> bool {
        self.stop();
        drain(&self.tracker, self.options.shutdown_grace).await
    }

    /// Waits until the relay is cancelled (by `stop`, a signal or the injected
    /// token), then for in-flight work within the grace period.
    pub async fn wait(&self) -> bool {
        self.cancel.cancelled().await;
        self.distributor.stop();
        drain(&self.tracker, self.options.shutdown_grace).await
    }

    /// # Add Client
    ///
    /// Registers a subscriber and returns its queue. After cancellation the
    /// returned queue is already closed.
    pub fn add_client(&self, id: &str) -> SubscriberQueue {
        if self.cancel.is_cancelled() {
            return closed_queue();
        }
        let queue = self.distributor.add_client(id);
        // A stop racing with this call has already drained the set; undo.
        if self.cancel.is_cancelled() {
            self.distributor.remove_client(id);
        }
        queue
    }

    /// Deregisters a subscriber and closes its queue.
    pub fn remove_client(&self, id: &str) {
        self.distributor.remove_client(id);
    }

    /// `true` once the upstream loop has been launched.
    pub fn is_started(&self) -> bool {
        self.source.initialized()
    }

    /// `true` once the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A clone of the relay's cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current upstream state.
    pub fn state(&self) -> RelayState {
        match self.source.get() {
            Some(source) => source.state(),
            None if self.cancel.is_cancelled() => RelayState::Cancelled,
            None => RelayState::Idle,
        }
    }

    /// Observes upstream state changes, once started.
    pub fn subscribe_state(&self) -> Option<watch::Receiver<RelayState>> {
        self.source.get().map(|source| source.subscribe_state())
    }

    /// The upstream URL, once started.
    pub fn upstream_url(&self) -> Option<&str> {
        self.source.get().map(|source| source.url())
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.source.get().map_or(0, |source| source.attempts())
    }

    /// Distributor counters.
    pub fn stats(&self) -> DistributorStats {
        self.distributor.stats()
    }

    /// The shared distributor.
    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }
}

fn closed_queue() -> SubscriberQueue {
    let (_tx, rx) = mpsc::channel(1);
    rx
}

async fn drain(tracker: &TaskTracker, grace: Duration) -> bool {
    tracker.close();
    match tokio::time::timeout(grace, tracker.wait()).await {
        Ok(()) => {
            tracing::info!("Relay tasks finished");
            true
        }
        Err(_) => {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Relay tasks still running after grace period");
            false
        }
    }
}

/// # Shutdown Signal
///
/// Resolves on Ctrl-C, or SIGTERM on UNIX. If a handler cannot be installed
/// that branch never resolves.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
