//! In-memory event bus for live progress notifications.
//!
//! Each subscriber owns an unbounded queue, so a slow reader never holds up
//! publication to the others. Delivery is best effort: nothing is persisted
//! and late subscribers do not see earlier events.
//!
//! ```text
//! ChainOrchestrator ─┐
//! StepExecutor ──────┼─► EventBus::publish ─► [queue per subscriber] ─► Subscription::next
//! heartbeat task ────┘                                                   (event | keep-alive)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;

pub const CONNECTED: &str = "connected";
pub const AGENT_RESPONSE: &str = "agent-response";
pub const RUN_UPDATE: &str = "run-update";
pub const CHAIN_COMPLETED: &str = "chain-completed";
pub const CHAIN_FAILED: &str = "chain-failed";
pub const BACKGROUND_UPDATE: &str = "background-update";

/// A named notification with a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl BusEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Item yielded by a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Event(BusEvent),
    /// Nothing arrived within the idle window.
    KeepAlive,
}

struct SubscriberSlot {
    token: u64,
    tx: mpsc::UnboundedSender<BusEvent>,
}

struct EventBusInner {
    subscribers: DashMap<String, SubscriberSlot>,
    next_token: AtomicU64,
    keep_alive: Duration,
}

/// Process-wide subscriber registry. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_keep_alive(Duration::from_secs(1))
    }

    /// Create a bus whose subscriptions emit a keep-alive after `keep_alive`
    /// of inactivity.
    pub fn with_keep_alive(keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: DashMap::new(),
                next_token: AtomicU64::new(1),
                keep_alive,
            }),
        }
    }

    /// Register `subscriber_id` and return its event sequence.
    ///
    /// The first item is always a `connected` greeting. Subscribing again
    /// with an id that is already registered replaces the old queue; the
    /// old subscription then ends.
    pub fn subscribe(&self, subscriber_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        let _ = tx.send(BusEvent::new(
            CONNECTED,
            serde_json::json!({ "message": "Connection established" }),
        ));

        if self
            .inner
            .subscribers
            .insert(subscriber_id.to_string(), SubscriberSlot { token, tx })
            .is_some()
        {
            tracing::debug!("[EventBus] Replaced existing subscriber {}", subscriber_id);
        }
        tracing::info!(
            "[EventBus] Subscriber {} connected ({} active)",
            subscriber_id,
            self.inner.subscribers.len()
        );

        Subscription {
            id: subscriber_id.to_string(),
            token,
            rx,
            keep_alive: self.inner.keep_alive,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Its subscription drains what is queued and ends.
    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let removed = self.inner.subscribers.remove(subscriber_id).is_some();
        if removed {
            tracing::info!("[EventBus] Subscriber {} removed", subscriber_id);
        }
        removed
    }

    /// Fan `event` out to every current subscriber.
    ///
    /// Returns how many queues accepted it. Publishing with no subscribers
    /// is a no-op.
    pub fn publish(&self, event: &str, data: serde_json::Value) -> usize {
        let message = BusEvent::new(event, data);
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.inner.subscribers.iter() {
            if entry.value().tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push((entry.key().clone(), entry.value().token));
            }
        }

        for (id, token) in closed {
            self.inner
                .subscribers
                .remove_if(&id, |_, slot| slot.token == token);
        }

        tracing::trace!("[EventBus] {} delivered to {} subscriber(s)", event, delivered);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn is_subscribed(&self, subscriber_id: &str) -> bool {
        self.inner.subscribers.contains_key(subscriber_id)
    }

    /// Spawn a task that broadcasts a `background-update` tick every
    /// `interval` while anyone is listening. The task stops once every
    /// handle to the bus is dropped. A zero interval ticks nothing and the
    /// task ends at once.
    pub fn spawn_background_updates(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            if interval.is_zero() {
                tracing::warn!("[EventBus] Background updates need a non-zero interval");
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            let mut count: u64 = 0;
            loop {
                ticker.tick().await;
                count += 1;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let bus = EventBus { inner };
                if bus.subscriber_count() > 0 {
                    bus.publish(
                        BACKGROUND_UPDATE,
                        serde_json::json!({ "count": count, "message": "Automatic update" }),
                    );
                }
            }
        })
    }
}

/// Receiving side of one subscriber. Unregisters itself when dropped.
pub struct Subscription {
    id: String,
    token: u64,
    rx: mpsc::UnboundedReceiver<BusEvent>,
    keep_alive: Duration,
    bus: Weak<EventBusInner>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next event, yielding [`BusMessage::KeepAlive`] when the
    /// idle window elapses first. Returns `None` once unsubscribed and
    /// drained.
    pub async fn next(&mut self) -> Option<BusMessage> {
        match tokio::time::timeout(self.keep_alive, self.rx.recv()).await {
            Ok(Some(event)) => Some(BusMessage::Event(event)),
            Ok(None) => None,
            Err(_) => Some(BusMessage::KeepAlive),
        }
    }

    /// Non-blocking poll for an already queued event.
    pub fn try_next(&mut self) -> Option<BusEvent> {
        self.rx.try_recv().ok()
    }

    /// Turn the subscription into an endless stream of messages.
    pub fn into_stream(self) -> impl Stream<Item = BusMessage> + Send {
        async_stream::stream! {
            let mut sub = self;
            while let Some(message) = sub.next().await {
                yield message;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let token = self.token;
            if inner
                .subscribers
                .remove_if(&self.id, |_, slot| slot.token == token)
                .is_some()
            {
                tracing::info!("[EventBus] Subscriber {} disconnected", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_event(sub: &mut Subscription) -> BusEvent {
        loop {
            match sub.next().await {
                Some(BusMessage::Event(event)) => return event,
                Some(BusMessage::KeepAlive) => continue,
                None => panic!("subscription closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(AGENT_RESPONSE, serde_json::json!({})), 0);
    }

    #[tokio::test]
    async fn test_first_item_is_connected_greeting() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("client-1");
        let event = next_event(&mut sub).await;
        assert_eq!(event.event, CONNECTED);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_publish() {
        let bus = EventBus::new();
        bus.publish(AGENT_RESPONSE, serde_json::json!({ "n": 1 }));

        let mut sub = bus.subscribe("late");
        assert_eq!(next_event(&mut sub).await.event, CONNECTED);
        assert!(sub.try_next().is_none());

        bus.publish(AGENT_RESPONSE, serde_json::json!({ "n": 2 }));
        let event = next_event(&mut sub).await;
        assert_eq!(event.data["n"], 2);
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        assert_eq!(bus.publish(RUN_UPDATE, serde_json::json!({ "x": true })), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(next_event(sub).await.event, CONNECTED);
            let event = next_event(sub).await;
            assert_eq!(event.event, RUN_UPDATE);
            assert_eq!(event.data["x"], true);
        }
    }

    #[tokio::test]
    async fn test_idle_subscription_yields_keep_alive() {
        let bus = EventBus::with_keep_alive(Duration::from_millis(20));
        let mut sub = bus.subscribe("idle");
        assert!(matches!(sub.next().await, Some(BusMessage::Event(_))));
        assert_eq!(sub.next().await, Some(BusMessage::KeepAlive));
    }

    #[tokio::test]
    async fn test_drop_and_unsubscribe_remove_subscriber() {
        let bus = EventBus::new();
        let sub = bus.subscribe("gone");
        assert!(bus.is_subscribed("gone"));
        drop(sub);
        assert!(!bus.is_subscribed("gone"));

        let mut sub = bus.subscribe("kicked");
        assert!(bus.unsubscribe("kicked"));
        assert_eq!(next_event(&mut sub).await.event, CONNECTED);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_resubscribe_keeps_newest_queue() {
        let bus = EventBus::new();
        let old = bus.subscribe("dup");
        let _new = bus.subscribe("dup");
        drop(old);
        assert!(bus.is_subscribed("dup"));
        assert_eq!(bus.publish(RUN_UPDATE, serde_json::json!({})), 1);
    }

    #[tokio::test]
    async fn test_background_updates_reach_subscribers() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ticks");
        let handle = bus.spawn_background_updates(Duration::from_millis(10));

        assert_eq!(next_event(&mut sub).await.event, CONNECTED);
        let tick = next_event(&mut sub).await;
        assert_eq!(tick.event, BACKGROUND_UPDATE);
        assert_eq!(tick.data["count"], 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_zero_background_interval_ends_quietly() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ticks");
        let handle = bus.spawn_background_updates(Duration::ZERO);

        assert!(handle.await.is_ok());
        assert_eq!(next_event(&mut sub).await.event, CONNECTED);
        assert!(sub.try_next().is_none());
    }
}
