//! Fan-out of hub events to live subscriber queues.
//!
//! The `NotificationHub` keeps one bounded queue per registered subscriber.
//! Broadcasting never blocks: if a subscriber's queue is full the event is
//! dropped for that subscriber only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::event::HubEvent;

/// Unique identifier for a hub subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct SubscriberEntry {
    filter: Option<String>,
    sender: mpsc::Sender<Arc<HubEvent>>,
    closed: CancellationToken,
}

impl SubscriberEntry {
    fn accepts(&self, event: &HubEvent) -> bool {
        match (&self.filter, event.filter_key()) {
            (None, _) | (_, None) => true,
            (Some(filter), Some(key)) => filter == key,
        }
    }
}

/// One live session's end of the hub
///
/// Obtained from [`NotificationHub::register`]. Once the subscriber is
/// unregistered, [`recv`](Self::recv) returns `None` and
/// [`closed`](Self::closed) resolves.
pub struct Subscriber {
    id: SubscriberId,
    filter: Option<String>,
    receiver: mpsc::Receiver<Arc<HubEvent>>,
    closed: CancellationToken,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Wait for the next event; `None` once unregistered
    pub async fn recv(&mut self) -> Option<Arc<HubEvent>> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            event = self.receiver.recv() => event,
        }
    }

    /// Take a queued event without waiting
    pub fn try_recv(&mut self) -> Option<Arc<HubEvent>> {
        if self.closed.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the subscriber has been unregistered
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

/// Best-effort, at-most-once broadcaster to many subscriber queues
pub struct NotificationHub {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberEntry>>,
    queue_capacity: usize,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl NotificationHub {
    /// Create a hub whose subscriber queues hold up to `queue_capacity` events
    ///
    /// A capacity of zero is raised to one.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a subscriber. `None` or an empty filter receives every event.
    pub fn register(&self, filter: Option<String>) -> Subscriber {
        let filter = filter.filter(|f| !f.is_empty());
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let closed = CancellationToken::new();

        self.subscribers.write().insert(
            id,
            SubscriberEntry {
                filter: filter.clone(),
                sender,
                closed: closed.clone(),
            },
        );

        tracing::debug!("Registered hub subscriber {} (filter: {:?})", id, filter);

        Subscriber {
            id,
            filter,
            receiver,
            closed,
        }
    }

    /// Remove a subscriber and signal its liveness token
    pub fn unregister(&self, subscriber: &Subscriber) -> bool {
        self.unregister_id(subscriber.id)
    }

    pub fn unregister_id(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id);
        match removed {
            Some(entry) => {
                entry.closed.cancel();
                tracing::debug!("Unregistered hub subscriber {}", id);
                true
            }
            None => false,
        }
    }

    /// Offer `event` to every matching subscriber without blocking
    ///
    /// Returns how many queues accepted the event. Full queues drop it;
    /// queues whose receiver is gone are pruned.
    pub fn broadcast(&self, event: HubEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut stale = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for (id, entry) in subscribers.iter() {
                if !entry.accepts(&event) {
                    continue;
                }
                match entry.sender.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!("Queue full, dropped {} for {}", event.event_type(), id);
                    }
                    Err(TrySendError::Closed(_)) => stale.push(*id),
                }
            }
        }

        for id in stale {
            self.unregister_id(id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total number of events dropped because a queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Unregister everyone, e.g. on shutdown
    pub fn close_all(&self) {
        let drained: Vec<SubscriberEntry> = self.subscribers.write().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.closed.cancel();
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn status_event(server_id: &str) -> HubEvent {
        HubEvent::ServerStatus {
            server_id: server_id.to_string(),
            status: json!({"connected": true}),
        }
    }

    #[tokio::test]
    async fn test_register_and_receive() {
        let hub = NotificationHub::new(8);
        let mut sub = hub.register(None);

        assert_eq!(hub.broadcast(status_event("srv1")), 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type(), "server_status");
    }

    #[tokio::test]
    async fn test_filtered_subscriber_only_gets_matching_events() {
        let hub = NotificationHub::new(8);
        let mut filtered = hub.register(Some("X".to_string()));
        let mut everything = hub.register(None);

        assert_eq!(hub.broadcast(status_event("Y")), 1);

        assert!(filtered.try_recv().is_none());
        let event = everything.try_recv().unwrap();
        assert_eq!(event.filter_key(), Some("Y"));

        assert_eq!(hub.broadcast(status_event("X")), 2);
        assert!(filtered.try_recv().is_some());
    }

    #[rstest]
    #[case(None)]
    #[case(Some("srv1"))]
    #[case(Some("other"))]
    fn test_unkeyed_events_reach_everyone(#[case] filter: Option<&str>) {
        let hub = NotificationHub::new(4);
        let mut sub = hub.register(filter.map(str::to_string));

        assert_eq!(hub.broadcast(HubEvent::ControlStatus { has_controller: true }), 1);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn test_empty_filter_means_everything() {
        let hub = NotificationHub::new(4);
        let sub = hub.register(Some(String::new()));
        assert_eq!(sub.filter(), None);
    }

    #[test]
    fn test_full_queue_drops_without_affecting_others() {
        let hub = NotificationHub::new(1);
        let mut slow = hub.register(None);
        let mut fast = hub.register(None);

        assert_eq!(hub.broadcast(status_event("srv1")), 2);
        assert!(fast.try_recv().is_some());

        // slow still holds the first event, its queue is full
        assert_eq!(hub.broadcast(status_event("srv2")), 1);
        assert_eq!(hub.dropped_count(), 1);

        let kept = slow.try_recv().unwrap();
        assert_eq!(kept.filter_key(), Some("srv1"));
        assert!(slow.try_recv().is_none());

        let next = fast.try_recv().unwrap();
        assert_eq!(next.filter_key(), Some("srv2"));
    }

    #[tokio::test]
    async fn test_unregister_signals_liveness() {
        let hub = NotificationHub::new(4);
        let mut sub = hub.register(None);
        hub.broadcast(status_event("srv1"));

        assert!(hub.unregister(&sub));
        assert!(!hub.unregister(&sub));
        assert_eq!(hub.subscriber_count(), 0);

        sub.closed().await;
        assert!(sub.is_closed());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let hub = NotificationHub::new(4);
        let sub = hub.register(None);
        let keep = hub.register(None);
        drop(sub);

        assert_eq!(hub.broadcast(status_event("srv1")), 1);
        assert_eq!(hub.subscriber_count(), 1);
        drop(keep);
    }

    #[test]
    fn test_close_all() {
        let hub = NotificationHub::default();
        let a = hub.register(None);
        let b = hub.register(Some("srv1".to_string()));

        hub.close_all();
        assert_eq!(hub.subscriber_count(), 0);
        assert!(a.is_closed());
        assert!(b.is_closed());
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        let hub = NotificationHub::new(4);
        let a = hub.register(None);
        let b = hub.register(None);
        assert_ne!(a.id(), b.id());
        assert_eq!(format!("{}", a.id()), format!("sub-{}", a.id().as_u64()));
    }
}
