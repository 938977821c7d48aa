//! Process-wide fan-out event bus.
//!
//! Every subscriber gets its own unbounded channel: publishing never
//! blocks on a slow consumer, no event is dropped for a live subscriber,
//! and per-subscriber delivery order always equals publish order. The
//! cost of that guarantee is unbounded buffering — a subscriber that
//! never drains its channel grows without limit.

use crate::events::Event;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, UnboundedSender<Event>>,
}

/// Fan-out pub/sub channel for [`Event`]s.
///
/// Cheap to clone; all clones share the same subscriber registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Create a new, independent delivery channel.
    ///
    /// The subscription receives every event published after this call;
    /// there is no replay of earlier events.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        Subscription { id, rx }
    }

    /// Stop future delivery to the given subscription.
    ///
    /// Events already queued on the subscription remain readable.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.subscribers.remove(&subscription.id);
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Never blocks; publishing with zero subscribers is a no-op.
    /// Subscribers whose receiving end was dropped are pruned.
    pub fn publish(&self, event: Event) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscriptions.
    #[allow(dead_code)] // Diagnostic utility
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's delivery channel.
pub struct Subscription {
    id: u64,
    rx: UnboundedReceiver<Event>,
}

impl Subscription {
    /// Receive the next event, in publish order.
    ///
    /// Returns `None` once the subscription was removed from the bus and
    /// all queued events have been drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive without waiting; `None` when the queue is currently empty.
    #[allow(dead_code)] // Used by observers that poll instead of await
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::json;

    fn test_event(tag: &str) -> Event {
        Event::new(EventType::AgentStarted, "test", json!({ "tag": tag }))
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(test_event("one"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.data["tag"], "one");
    }

    #[tokio::test]
    async fn test_per_subscriber_fifo_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        for i in 0..100 {
            bus.publish(test_event(&i.to_string()));
        }

        for i in 0..100 {
            assert_eq!(a.recv().await.unwrap().data["tag"], i.to_string());
            assert_eq!(b.recv().await.unwrap().data["tag"], i.to_string());
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(test_event("nobody"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_future_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(test_event("before"));
        bus.unsubscribe(&sub);
        bus.publish(test_event("after"));

        // The queued event survives, the post-unsubscribe one never arrives.
        assert_eq!(sub.recv().await.unwrap().data["tag"], "before");
        assert!(sub.recv().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        bus.publish(test_event("x"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_publishers_lose_nothing() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let mut handles = Vec::new();
        for p in 0..8 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    bus.publish(test_event(&format!("{p}-{i}")));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut received = 0;
        while sub.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 8 * 50);
    }
}
