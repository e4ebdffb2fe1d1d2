//! Topic-based event bus
//!
//! Anyone may publish. Subscribing is crate-private: the only public way to
//! receive events is `SubscriptionGuard::bind`, which ties every subscription
//! to a screen's lifetime.

use crate::error::{Error, Result};
use crate::services::ServiceKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Directory key for the application event bus
pub const EVENTS: ServiceKey<EventBus> = ServiceKey::new("events");

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
static NEXT_BUS: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one active subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// One published event on its way to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub token: SubscriptionToken,
    pub topic: String,
    pub payload: Value,
}

/// Where deliveries go; the host routes them onto the interaction thread
pub trait EventSink: Send + Sync {
    /// Returns false when the receiving side is gone
    fn deliver(&self, delivery: Delivery) -> bool;
}

impl EventSink for mpsc::UnboundedSender<Delivery> {
    fn deliver(&self, delivery: Delivery) -> bool {
        self.send(delivery).is_ok()
    }
}

struct Subscriber {
    token: SubscriptionToken,
    sink: Arc<dyn EventSink>,
}

pub struct EventBus {
    id: u64,
    topics: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            id: NEXT_BUS.fetch_add(1, Ordering::Relaxed),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Publish to every subscriber of `topic`; returns how many were reached
    ///
    /// A payload that fails to serialize is delivered to nobody.
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, data: &T) -> Result<usize> {
        let payload = serde_json::to_value(data).map_err(|err| {
            log::error!("Refusing to publish '{}': {}", topic, err);
            Error::InvalidEventPayload {
                topic: topic.to_string(),
                reason: err.to_string(),
            }
        })?;
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);

        let Some(subscribers) = topics.get(topic) else {
            log::debug!("Published '{}' with no subscribers", topic);
            return Ok(0);
        };

        let mut delivered = 0;
        for subscriber in subscribers {
            let delivery = Delivery {
                token: subscriber.token,
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if subscriber.sink.deliver(delivery) {
                delivered += 1;
            } else {
                log::warn!(
                    "Subscriber {:?} on '{}' is no longer receiving",
                    subscriber.token, topic
                );
            }
        }

        log::debug!("Published '{}' to {} subscriber(s)", topic, delivered);
        Ok(delivered)
    }

    pub(crate) fn subscribe(&self, topic: &str, sink: Arc<dyn EventSink>) -> SubscriptionToken {
        let token = SubscriptionToken::next();
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { token, sink });
        token
    }

    /// Remove a subscription; returns false if it was not active
    pub(crate) fn cancel(&self, topic: &str, token: SubscriptionToken) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.token != token);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
