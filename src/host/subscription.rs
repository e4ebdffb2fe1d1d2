//! Subscriptions scoped to one screen controller's lifetime

use super::events::{EventBus, EventSink, SubscriptionToken};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a subscription listens to
///
/// Two descriptors are equivalent when topic and key match; binding an
/// equivalent descriptor again returns the existing token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionDescriptor {
    topic: String,
    key: Option<String>,
}

impl SubscriptionDescriptor {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
        }
    }

    /// Distinguish several subscriptions to the same topic
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn topic_name(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Shared flag telling in-flight work that its guard has released
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

struct Binding {
    token: SubscriptionToken,
    bus: Arc<EventBus>,
}

/// Owns every subscription of one screen controller
///
/// The host creates one guard per controller instance and releases it when
/// the controller is discarded. Release is idempotent and also happens on drop.
pub struct SubscriptionGuard {
    owner: String,
    sink: Arc<dyn EventSink>,
    bindings: HashMap<(u64, SubscriptionDescriptor), Binding>,
    flag: CancellationFlag,
}

impl SubscriptionGuard {
    pub fn new(owner: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            owner: owner.into(),
            sink,
            bindings: HashMap::new(),
            flag: CancellationFlag::default(),
        }
    }

    /// Subscribe through this guard
    ///
    /// An equivalent descriptor on the same bus that is already active yields
    /// the existing token without creating a second subscription.
    pub fn bind(
        &mut self,
        bus: &Arc<EventBus>,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionToken> {
        if self.is_released() {
            return Err(Error::GuardReleased(self.owner.clone()));
        }

        let slot = (bus.id(), descriptor);
        if let Some(binding) = self.bindings.get(&slot) {
            log::debug!(
                "'{}' already bound to '{}', reusing {:?}",
                self.owner, slot.1.topic, binding.token
            );
            return Ok(binding.token);
        }

        let token = bus.subscribe(&slot.1.topic, Arc::clone(&self.sink));
        log::debug!("'{}' bound {:?} to '{}'", self.owner, token, slot.1.topic);
        self.bindings.insert(
            slot,
            Binding {
                token,
                bus: Arc::clone(bus),
            },
        );
        Ok(token)
    }

    /// Cancel every subscription; returns how many were cancelled
    pub fn release_all(&mut self) -> usize {
        if self.is_released() {
            return 0;
        }
        self.flag.cancel();

        let released = self.bindings.len();
        for ((_, descriptor), binding) in self.bindings.drain() {
            binding.bus.cancel(&descriptor.topic, binding.token);
        }

        if released > 0 {
            log::debug!("'{}' released {} subscription(s)", self.owner, released);
        }
        released
    }

    pub fn owns(&self, token: SubscriptionToken) -> bool {
        self.bindings.values().any(|binding| binding.token == token)
    }

    pub fn descriptor_of(&self, token: SubscriptionToken) -> Option<&SubscriptionDescriptor> {
        self.bindings
            .iter()
            .find(|(_, binding)| binding.token == token)
            .map(|((_, descriptor), _)| descriptor)
    }

    pub fn active_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_released(&self) -> bool {
        self.flag.is_cancelled()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Flag for async work started by the owning controller
    pub fn cancellation(&self) -> CancellationFlag {
        self.flag.clone()
    }

    /// Run `future`, discarding its output if this guard released meanwhile
    pub fn scope<F>(&self, future: F) -> impl Future<Output = Option<F::Output>> + Send + use<F>
    where
        F: Future + Send + 'static,
        F::Output: Send,
    {
        let flag = self.cancellation();
        async move {
            let output = future.await;
            (!flag.is_cancelled()).then_some(output)
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release_all();
    }
}
