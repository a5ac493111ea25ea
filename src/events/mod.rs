// events/mod.rs
mod message;

pub use message::{Message, REQUEST_ID_KEY};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe transport shared between the dispatcher and its peers.
#[async_trait]
pub trait Bus: Send + Sync {
    fn on(&self, topic: &str, handler: Handler) -> SubscriptionId;

    /// Returns `false` if `id` was not subscribed to `topic`.
    fn remove(&self, topic: &str, id: SubscriptionId) -> bool;

    fn emit(&self, message: Message);

    /// Emits `message` and waits for its `.response`, or `None` after `timeout`.
    async fn wait_for_response(&self, message: Message, timeout: Duration) -> Option<Message>;
}

/// In-process bus. Handlers run synchronously inside `emit`, in the order
/// they subscribed, so each message is fully handled before `emit` returns.
/// Every emitted message is also copied to a broadcast tap for observers
/// such as websocket clients.
pub struct EventBus {
    subscribers: DashMap<String, Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<Message>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity);
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            tap,
        }
    }

    /// Receives a copy of every message emitted after this call.
    pub fn tap(&self) -> broadcast::Receiver<Message> {
        self.tap.subscribe()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .get(topic)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscribers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        topics.sort();
        topics
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for EventBus {
    fn on(&self, topic: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&self, topic: &str, id: SubscriptionId) -> bool {
        let Some(mut entry) = self.subscribers.get_mut(topic) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|(subscription, _)| *subscription != id);
        let removed = entry.len() != before;
        drop(entry);

        self.subscribers
            .remove_if(topic, |_, handlers| handlers.is_empty());
        removed
    }

    fn emit(&self, message: Message) {
        // Fails only when nobody is tapping the bus.
        let _ = self.tap.send(message.clone());

        // Handlers may emit replies, so the map guard is released before
        // any of them runs.
        let handlers: Vec<Handler> = match self.subscribers.get(&message.msg_type) {
            Some(entry) => entry.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
            None => {
                debug!(topic = %message.msg_type, "No subscribers");
                return;
            }
        };

        for handler in handlers {
            handler(&message);
        }
    }

    async fn wait_for_response(&self, mut message: Message, timeout: Duration) -> Option<Message> {
        if message.request_id().is_none() {
            message.set_request_id(&Uuid::new_v4().to_string());
        }

        let mut rx = self.tap.subscribe();
        let request = message.clone();
        self.emit(message);

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(reply) if reply.is_response_to(&request) => return Some(reply),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, topic = %request.msg_type, "Response waiter lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Handler {
        let log = Arc::clone(log);
        Arc::new(move |message: &Message| {
            log.lock().unwrap().push(format!("{label}:{}", message.msg_type));
        })
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.on("a", recorder(&log, "first"));
        bus.on("a", recorder(&log, "second"));
        bus.on("b", recorder(&log, "other"));

        bus.emit(Message::new("a", json!({})));

        assert_eq!(*log.lock().unwrap(), vec!["first:a", "second:a"]);
    }

    #[test]
    fn test_remove_only_drops_given_subscription() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = bus.on("a", recorder(&log, "first"));
        bus.on("a", recorder(&log, "second"));

        assert!(bus.remove("a", first));
        assert!(!bus.remove("a", first));
        assert!(!bus.remove("missing", first));
        assert_eq!(bus.subscriber_count("a"), 1);

        bus.emit(Message::new("a", json!({})));
        assert_eq!(*log.lock().unwrap(), vec!["second:a"]);
    }

    #[test]
    fn test_empty_topics_are_dropped() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = bus.on("a", recorder(&log, "only"));
        assert_eq!(bus.topics(), vec!["a".to_string()]);

        bus.remove("a", id);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_handler_can_emit_reply() {
        let bus = Arc::new(EventBus::new());
        let mut tap = bus.tap();

        let weak = Arc::downgrade(&bus);
        bus.on(
            "ping",
            Arc::new(move |message: &Message| {
                if let Some(bus) = weak.upgrade() {
                    bus.emit(message.response(json!("pong")));
                }
            }),
        );

        bus.emit(Message::new("ping", json!({})));

        assert_eq!(tap.try_recv().unwrap().msg_type, "ping");
        let reply = tap.try_recv().unwrap();
        assert_eq!(reply.msg_type, "ping.response");
        assert_eq!(reply.data, json!("pong"));
    }

    #[tokio::test]
    async fn test_wait_for_response() {
        let bus = Arc::new(EventBus::new());
        let weak = Arc::downgrade(&bus);
        bus.on(
            "ping",
            Arc::new(move |message: &Message| {
                if let Some(bus) = weak.upgrade() {
                    bus.emit(message.response(json!("pong")));
                }
            }),
        );

        let reply = bus
            .wait_for_response(Message::new("ping", json!({})), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply.data, json!("pong"));
        assert!(reply.request_id().is_some());
    }

    #[tokio::test]
    async fn test_wait_for_response_times_out() {
        let bus = EventBus::new();

        let reply = bus
            .wait_for_response(Message::new("nobody.home", json!({})), Duration::from_millis(20))
            .await;

        assert!(reply.is_none());
    }
}
