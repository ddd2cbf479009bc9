//! Debounced publish/subscribe bus

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::debounce::Debouncer;
use crate::event::BusEvent;
use crate::topic::Topic;

type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: RwLock<HashMap<Topic, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn add(&self, topic: Topic, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().entry(topic).or_default().push((id, listener));
        id
    }

    fn remove(&self, topic: Topic, id: u64) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&topic) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&topic);
        }
        removed
    }

    fn count(&self, topic: Topic) -> usize {
        self.listeners.read().get(&topic).map_or(0, Vec::len)
    }

    fn dispatch(&self, event: &BusEvent) {
        let topic = event.topic();
        // listeners may subscribe or unsubscribe from inside a callback
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .get(&topic)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        debug!("Dispatching {} to {} listeners", topic, snapshot.len());
        for listener in snapshot {
            listener(event);
        }
    }
}

/// Handle for a registered listener; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    registry: Weak<Registry>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Remove the listener now
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.topic, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).field("id", &self.id).finish()
    }
}

/// Typed, debounced event bus.
///
/// Each topic has its own debouncer, so a burst of NAV updates never delays
/// a currency change. Cloning the bus yields another handle to the same
/// registry.
#[derive(Clone)]
pub struct UpdateBus {
    registry: Arc<Registry>,
    debouncers: Arc<HashMap<Topic, Debouncer<BusEvent>>>,
}

impl UpdateBus {
    pub fn new(config: BusConfig) -> Self {
        let registry = Arc::new(Registry::default());
        let window = config.debounce_window();

        let debouncers = Topic::ALL
            .into_iter()
            .map(|topic| {
                let registry = Arc::clone(&registry);
                let debouncer = Debouncer::new(window, move |event: BusEvent| registry.dispatch(&event));
                (topic, debouncer)
            })
            .collect();

        Self { registry, debouncers: Arc::new(debouncers) }
    }

    /// Register `callback` for `topic`
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.registry.add(topic, Arc::new(callback));
        Subscription { registry: Arc::downgrade(&self.registry), topic, id }
    }

    /// Register `callback` under a canonical or legacy event name
    pub fn subscribe_named(
        &self,
        name: &str,
        callback: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Option<Subscription> {
        match Topic::from_name(name) {
            Some(topic) => Some(self.subscribe(topic, callback)),
            None => {
                warn!("Ignoring subscription to unknown event '{}'", name);
                None
            }
        }
    }

    /// Publish `event` on its topic through the debouncer
    pub fn publish(&self, event: BusEvent) {
        match self.debouncers.get(&event.topic()) {
            Some(debouncer) => debouncer.trigger(event),
            None => self.registry.dispatch(&event),
        }
    }

    /// Publish under a canonical or legacy event name.
    ///
    /// Unknown names, or names that do not match the event's topic, are
    /// ignored with a warning. Returns whether the event was accepted.
    pub fn publish_named(&self, name: &str, event: BusEvent) -> bool {
        match Topic::from_name(name) {
            Some(topic) if topic == event.topic() => {
                self.publish(event);
                true
            }
            Some(topic) => {
                warn!("Event name '{}' resolves to {} but payload is {}", name, topic, event.topic());
                false
            }
            None => {
                warn!("Ignoring publish to unknown event '{}'", name);
                false
            }
        }
    }

    /// Deliver every pending event immediately
    pub fn flush(&self) {
        for topic in Topic::ALL {
            if let Some(debouncer) = self.debouncers.get(&topic) {
                debouncer.flush();
            }
        }
    }

    /// Whether `topic` has an event waiting for delivery
    pub fn is_pending(&self, topic: Topic) -> bool {
        self.debouncers.get(&topic).is_some_and(Debouncer::is_pending)
    }

    /// Number of live listeners on `topic`
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry.count(topic)
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
