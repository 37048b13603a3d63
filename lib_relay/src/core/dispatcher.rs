//! # Lossy, Zero-Copy Message Distributor
//!
//! The `Distributor` takes one formatted event from the upstream loop and hands
//! it to every registered subscriber queue.
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: the message is wrapped in an `Arc<str>` once; each
//!     subscriber receives a pointer to the same allocation.
//!
//! 2.  **Lossy Backpressure**: every subscriber owns a *bounded* queue. Delivery
//!     uses `try_send`, so a full queue never blocks the broadcast. The message
//!     is simply skipped for that subscriber and counted as a slow-consumer drop.
//!
//! 3.  **Single Lock**: add, remove, broadcast and stop all run under one
//!     `std::sync::Mutex`. None of them awaits while holding it, so the lock is
//!     only ever held for the length of a map operation or one fan-out pass.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::DEFAULT_QUEUE_CAPACITY;

/// The receiving half handed to the transport layer for one subscriber.
pub type SubscriberQueue = mpsc::Receiver<Arc<str>>;

/// # Subscriber Handle
///
/// The distributor's side of one subscriber: the sending half of its queue and
/// how many messages it has lost so far.
struct SubscriberHandle {
    sender: mpsc::Sender<Arc<str>>,
    dropped: u64,
}

/// Point-in-time counters of a `Distributor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributorStats {
    /// Subscribers currently registered.
    pub subscribers: usize,
    /// Calls to `broadcast`.
    pub broadcasts: u64,
    /// Successful enqueues, summed over subscribers.
    pub delivered: u64,
    /// Skipped enqueues because a queue was full.
    pub dropped: u64,
}

/// # Core Distributor
///
/// Owns the live subscriber set. It never touches the connection behind a
/// subscriber, only the in-process queue.
pub struct Distributor {
    subscribers: Mutex<HashMap<String, SubscriberHandle>>,
    capacity: usize,
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Distributor {
    /// Creates an empty distributor whose queues hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            broadcasts: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// A poisoned lock only means another thread panicked mid-operation; the
    /// map itself is still consistent, so keep serving.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SubscriberHandle>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// # Add Client
    ///
    /// Registers `id` and returns the receiving half of its bounded queue.
    ///
    /// Registering an id twice replaces the earlier queue; the earlier receiver
    /// observes end-of-stream once it has drained.
    pub fn add_client(&self, id: &str) -> SubscriberQueue {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = SubscriberHandle {
            sender: tx,
            dropped: 0,
        };

        let replaced = self.lock().insert(id.to_string(), handle).is_some();
        if replaced {
            tracing::info!(client = id, "Client re-registered, previous queue closed");
        } else {
            tracing::info!(client = id, capacity = self.capacity, "Client registered");
        }
        rx
    }

    /// Removes `id` and closes its queue. Unknown ids are ignored.
    pub fn remove_client(&self, id: &str) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(handle) => {
                tracing::info!(client = id, dropped = handle.dropped, "Client removed");
                // Dropping the only sender closes the queue.
                drop(handle);
                true
            }
            None => false,
        }
    }

    /// # Broadcast
    ///
    /// Offers `message` to every subscriber without waiting.
    ///
    /// ## Logic:
    /// 1.  A full queue skips this message for that subscriber only.
    /// 2.  A closed queue (receiver dropped without `remove_client`) is pruned.
    ///
    /// Returns the number of queues that accepted the message.
    pub fn broadcast(&self, message: impl Into<Arc<str>>) -> usize {
        let message: Arc<str> = message.into();
        self.broadcasts.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.lock();
        let mut delivered = 0usize;
        let mut dropped = 0u64;

        subscribers.retain(|id, handle| match handle.sender.try_send(Arc::clone(&message)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                handle.dropped += 1;
                dropped += 1;
                tracing::warn!(
                    client = id.as_str(),
                    dropped_total = handle.dropped,
                    "Slow consumer, message dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::info!(client = id.as_str(), "Client queue closed, removing from distributor");
                false
            }
        });
        drop(subscribers);

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(dropped, Ordering::Relaxed);
        delivered
    }

    /// Closes every queue and forgets every subscriber. New clients may still
    /// be added afterwards.
    pub fn stop(&self) {
        let drained: Vec<(String, SubscriberHandle)> = self.lock().drain().collect();
        tracing::info!(clients = drained.len(), "Distributor stopped, all queues closed");
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Capacity of each subscriber queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DistributorStats {
        DistributorStats {
            subscribers: self.len(),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn full_queue_does_not_block_other_subscribers() {
        let distributor = Distributor::new(1);
        let mut a = distributor.add_client("a");
        let mut b = distributor.add_client("b");
        let mut c = distributor.add_client("c");

        // Fill b's single slot.
        assert_eq!(distributor.broadcast("first"), 3);
        assert_eq!(&*a.try_recv().unwrap(), "first");
        assert_eq!(&*c.try_recv().unwrap(), "first");

        assert_eq!(distributor.broadcast("second"), 2);
        assert_eq!(&*a.try_recv().unwrap(), "second");
        assert_eq!(&*c.try_recv().unwrap(), "second");

        // b still only holds the first message; the second was dropped for it.
        assert_eq!(&*b.try_recv().unwrap(), "first");
        assert_eq!(b.try_recv(), Err(TryRecvError::Empty));

        let stats = distributor.stats();
        assert_eq!(stats.broadcasts, 2);
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.subscribers, 3);
    }

    #[test]
    fn per_subscriber_order_is_preserved() {
        let distributor = Distributor::new(8);
        let mut rx = distributor.add_client("ordered");
        for i in 0..5 {
            distributor.broadcast(format!("m{i}"));
        }
        for i in 0..5 {
            assert_eq!(&*rx.try_recv().unwrap(), format!("m{i}"));
        }
    }

    #[test]
    fn removed_client_is_closed_and_never_fed_again() {
        let distributor = Distributor::new(4);
        let mut rx = distributor.add_client("gone");
        distributor.broadcast("before");

        assert!(distributor.remove_client("gone"));
        assert!(!distributor.remove_client("gone"));
        assert_eq!(distributor.broadcast("after"), 0);

        assert_eq!(&*rx.try_recv().unwrap(), "before");
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
        assert!(!distributor.contains("gone"));
    }

    #[test]
    fn re_adding_an_id_replaces_the_queue() {
        let distributor = Distributor::new(4);
        let mut old = distributor.add_client("dup");
        let mut new = distributor.add_client("dup");
        assert_eq!(distributor.len(), 1);

        distributor.broadcast("hello");
        assert_eq!(old.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(&*new.try_recv().unwrap(), "hello");
    }

    #[test]
    fn dropped_receiver_is_pruned_on_broadcast() {
        let distributor = Distributor::new(4);
        let rx = distributor.add_client("ghost");
        drop(rx);
        assert_eq!(distributor.broadcast("x"), 0);
        assert!(distributor.is_empty());
    }

    #[test]
    fn stop_closes_everything_and_allows_restart() {
        let distributor = Distributor::new(4);
        let mut a = distributor.add_client("a");
        let mut b = distributor.add_client("b");
        distributor.stop();

        assert!(distributor.is_empty());
        assert_eq!(a.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(b.try_recv(), Err(TryRecvError::Disconnected));

        let mut again = distributor.add_client("a");
        distributor.broadcast("back");
        assert_eq!(&*again.try_recv().unwrap(), "back");
    }
}
