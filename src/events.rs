//! Topic-keyed in-process event bus for distributing events to subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::trace;

/// In-process publish/subscribe bus keyed by topic name.
///
/// Fan-out is broadcast: every subscriber registered under a topic receives
/// every event published to it, in publish order. There is no replay; a
/// subscriber only sees events published after it registered. Registration
/// and fan-out are serialized by the registry lock, so a subscriber added
/// mid-publish either fully misses that publish or is unaffected by it.
pub struct EventBus<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

struct Registry<T> {
    next_id: u64,
    topics: HashMap<String, Vec<Channel<T>>>,
}

struct Channel<T> {
    id: u64,
    tx: mpsc::UnboundedSender<T>,
}

/// A live registration returned by [`EventBus::subscribe`].
///
/// Receives every event published to its topic until it is unsubscribed.
/// Dropping the subscription deregisters it promptly, so a connection that
/// goes away cannot leave a registration behind.
pub struct Subscription<T> {
    topic: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T: Clone> EventBus<T> {
    /// Create a new bus with no topics.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                topics: HashMap::new(),
            })),
        }
    }

    /// Fan `payload` out to every channel currently registered under `topic`.
    ///
    /// Returns the number of subscribers that received the event. Zero
    /// subscribers is a no-op, not an error. Channels whose receiver has
    /// gone away are pruned here.
    pub fn publish(&self, topic: &str, payload: T) -> usize {
        let mut registry = lock(&self.inner);
        let Some(channels) = registry.topics.get_mut(topic) else {
            trace!(topic, "no subscribers for published event");
            return 0;
        };

        let mut delivered = 0;
        channels.retain(|channel| match channel.tx.send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => false,
        });
        if channels.is_empty() {
            registry.topics.remove(topic);
        }

        trace!(topic, delivered, "event published");
        delivered
    }

    /// Register a new delivery channel under `topic`.
    ///
    /// Each call yields an independent channel; concurrent subscribers to
    /// the same topic each receive every subsequent event.
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription<T> {
        let topic = topic.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut registry = lock(&self.inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .topics
            .entry(topic.clone())
            .or_default()
            .push(Channel { id, tx });

        Subscription {
            topic,
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deregister `subscription`; subsequent publishes are not delivered to
    /// it. Idempotent: unsubscribing twice is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription<T>) {
        deregister(&self.inner, &subscription.topic, subscription.id);
    }

    /// Number of channels currently registered under `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.inner)
            .topics
            .get(topic)
            .map_or(0, |channels| channels.len())
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        // Clones share the same registry.
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Subscription<T> {
    /// Receive the next event on this channel.
    ///
    /// Returns `None` once the subscription has been deregistered and any
    /// already-delivered events have been drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Receive without blocking; `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Topic this subscription is registered under.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            deregister(&inner, &self.topic, self.id);
        }
    }
}

fn deregister<T>(inner: &Mutex<Registry<T>>, topic: &str, id: u64) {
    let mut registry = lock(inner);
    if let Some(channels) = registry.topics.get_mut(topic) {
        channels.retain(|channel| channel.id != id);
        if channels.is_empty() {
            registry.topics.remove(topic);
        }
    }
}

fn lock<T>(inner: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // A panic while holding the lock leaves the registry itself intact.
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
