//! Change notifier: coarse "something changed" signals per topic.
//!
//! Stores call [`Notifier::publish`] after every successful mutation. Each
//! subscriber owns a bounded queue fed with `try_send`: a full queue drops
//! the signal (the subscriber already has one pending and will resync
//! anyway) and a closed queue is pruned. Publishing never fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};

/// What kind of data changed. Signals carry no payload; receivers re-read
/// the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Reports,
    Status,
    Archive,
}

impl Topic {
    pub const ALL: [Self; 3] = [Self::Reports, Self::Status, Self::Archive];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reports => "reports",
            Self::Status => "status",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque subscription handle id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    topics: Vec<Topic>,
    tx: mpsc::Sender<Topic>,
}

struct Registry {
    next_id: AtomicU64,
    capacity: usize,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl Registry {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.subscribers().remove(&id).is_some()
    }
}

/// Fan-out point shared by every store. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<Registry>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    /// Create a notifier whose subscribers each buffer up to `capacity` signals.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register interest in `topics`. An empty slice means every topic.
    #[must_use]
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        let mut topics = if topics.is_empty() {
            Topic::ALL.to_vec()
        } else {
            topics.to_vec()
        };
        topics.sort_by_key(|t| t.as_str());
        topics.dedup();

        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        tracing::debug!(subscription = id.0, ?topics, "subscribed");
        self.registry
            .subscribers()
            .insert(id, Subscriber { topics, tx });

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Cancel `subscription`. Nothing is delivered to it afterwards.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.registry.remove(subscription.id);
        drop(subscription);
    }

    /// Signal every subscriber interested in `topic`. Returns how many
    /// subscribers had the signal queued.
    pub fn publish(&self, topic: Topic) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.registry.subscribers();
            for (id, sub) in subscribers.iter() {
                if !sub.topics.contains(&topic) {
                    continue;
                }
                match sub.tx.try_send(topic) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(subscription = id.0, %topic, "subscriber queue full, signal dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        for id in closed {
            tracing::warn!(subscription = id.0, %topic, "pruning closed subscriber");
            self.registry.remove(id);
        }

        tracing::trace!(%topic, delivered, "published");
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers().len()
    }
}

/// Receiving half of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Topic>,
    registry: Weak<Registry>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next signal. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<Topic> {
        self.rx.recv().await
    }

    /// Take a pending signal without waiting.
    pub fn try_recv(&mut self) -> Option<Topic> {
        self.rx.try_recv().ok()
    }

    /// Discard every signal currently queued. Returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while self.rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
            tracing::debug!(subscription = self.id.0, "unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_only_interested_subscribers() {
        let notifier = Notifier::new(8);
        let mut reports = notifier.subscribe(&[Topic::Reports]);
        let mut everything = notifier.subscribe(&[]);

        assert_eq!(notifier.publish(Topic::Status), 1);
        assert_eq!(notifier.publish(Topic::Reports), 2);

        assert_eq!(reports.recv().await, Some(Topic::Reports));
        assert_eq!(reports.try_recv(), None);
        assert_eq!(everything.recv().await, Some(Topic::Status));
        assert_eq!(everything.recv().await, Some(Topic::Reports));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let notifier = Notifier::default();
        assert_eq!(notifier.publish(Topic::Archive), 0);
    }

    #[test]
    fn full_queue_drops_without_failing() {
        let notifier = Notifier::new(2);
        let mut sub = notifier.subscribe(&[Topic::Status]);
        for _ in 0..10 {
            notifier.publish(Topic::Status);
        }
        assert_eq!(sub.drain(), 2);
    }

    #[test]
    fn unsubscribe_and_drop_stop_delivery() {
        let notifier = Notifier::new(4);
        let a = notifier.subscribe(&[Topic::Reports]);
        let b = notifier.subscribe(&[Topic::Reports]);
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.unsubscribe(a);
        assert_eq!(notifier.subscriber_count(), 1);
        drop(b);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.publish(Topic::Reports), 0);
    }

    #[tokio::test]
    async fn recv_ends_when_notifier_dropped() {
        let notifier = Notifier::new(4);
        let mut sub = notifier.subscribe(&[Topic::Archive]);
        notifier.publish(Topic::Archive);
        drop(notifier);
        assert_eq!(sub.recv().await, Some(Topic::Archive));
        assert_eq!(sub.recv().await, None);
    }
}
