//! HTTP surface of the relay: the `/events` SSE endpoint plus `/health` and
//! `/stats`.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::stream;
use lib_relay::core::EVENT_STREAM;
use lib_relay::{Connector, RelayLifecycle, SubscriberQueue};
use serde::Serialize;

/// Shared state of the HTTP handlers.
pub struct AppState<C: Connector> {
    relay: Arc<RelayLifecycle<C>>,
    next_id: AtomicU64,
}

impl<C: Connector> AppState<C> {
    pub fn new(relay: Arc<RelayLifecycle<C>>) -> Self {
        Self {
            relay,
            next_id: AtomicU64::new(0),
        }
    }

    fn next_client_id(&self) -> String {
        format!("sse-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    state: String,
    started: bool,
    upstream_url: Option<String>,
    attempts: u64,
    queue_capacity: usize,
    subscribers: usize,
    broadcasts: u64,
    delivered: u64,
    dropped: u64,
}

pub fn router<C: Connector>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler::<C>))
        .route("/events", get(events_handler::<C>))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler<C: Connector>(State(state): State<Arc<AppState<C>>>) -> Json<StatsResponse> {
    let relay = &state.relay;
    let stats = relay.stats();
    Json(StatsResponse {
        state: relay.state().to_string(),
        started: relay.is_started(),
        upstream_url: relay.upstream_url().map(str::to_string),
        attempts: relay.attempts(),
        queue_capacity: relay.distributor().capacity(),
        subscribers: stats.subscribers,
        broadcasts: stats.broadcasts,
        delivered: stats.delivered,
        dropped: stats.dropped,
    })
}

/// Deregisters its subscriber when the response body is dropped, which is
/// what happens when the HTTP client goes away.
struct ClientGuard<C: Connector> {
    relay: Arc<RelayLifecycle<C>>,
    id: String,
}

impl<C: Connector> Drop for ClientGuard<C> {
    fn drop(&mut self) {
        self.relay.remove_client(&self.id);
        tracing::info!(client = %self.id, "SSE client disconnected");
    }
}

/// Turns a subscriber queue into a response body stream. Messages are already
/// wire-formatted events and are written verbatim.
fn subscriber_body<C: Connector>(queue: SubscriberQueue, guard: ClientGuard<C>) -> Body {
    let frames = stream::unfold((queue, guard), |(mut queue, guard)| async move {
        let message = queue.recv().await?;
        let chunk = Bytes::copy_from_slice(message.as_bytes());
        Some((Ok::<_, Infallible>(chunk), (queue, guard)))
    });
    Body::from_stream(frames)
}

async fn events_handler<C: Connector>(State(state): State<Arc<AppState<C>>>) -> impl IntoResponse {
    let id = state.next_client_id();
    let queue = state.relay.add_client(&id);
    tracing::info!(client = %id, "SSE client connected");

    let guard = ClientGuard {
        relay: Arc::clone(&state.relay),
        id,
    };

    (
        [(CONTENT_TYPE, EVENT_STREAM), (CACHE_CONTROL, "no-cache")],
        subscriber_body(queue, guard),
    )
}
