//! State Bus - topic-keyed publish/subscribe of CurrentState
//!
//! Delivery is at most once per subscriber per publish. Subscriptions live
//! exactly as long as the subscriber's mailbox: dropping the mailbox (or the
//! task that owns it) removes it from every topic at once.

use crate::config::StateBusConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tcs_types::{CurrentState, StateUpdate, TopicKey};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

type Topics = DashMap<TopicKey, Vec<SubscriberHandle>>;

/// Remove subscriber `id` everywhere, forgetting topics left without subscribers
fn detach(topics: &Topics, id: Uuid) {
    topics.retain(|_, entries| {
        entries.retain(|s| s.id != id);
        !entries.is_empty()
    });
}

/// Sending side of a subscriber mailbox, used to register subscriptions
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: Uuid,
    tx: mpsc::Sender<StateUpdate>,
}

impl SubscriberHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of a subscriber mailbox
#[derive(Debug)]
pub struct Mailbox {
    id: Uuid,
    rx: mpsc::Receiver<StateUpdate>,
    topics: Weak<Topics>,
}

impl Mailbox {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StateUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StateUpdate> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        if let Some(topics) = self.topics.upgrade() {
            detach(&topics, self.id);
        }
    }
}

/// Anything that consumes state updates
#[async_trait]
pub trait StateSubscriber: Send + Sync {
    async fn on_state(&self, update: StateUpdate);
}

/// Topic registry and fan-out
pub struct StateBus {
    topics: Arc<Topics>,
    config: StateBusConfig,
}

impl StateBus {
    pub fn new(config: &StateBusConfig) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            config: config.clone(),
        }
    }

    /// Create a bounded subscriber mailbox
    pub fn mailbox(&self) -> (SubscriberHandle, Mailbox) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let mailbox = Mailbox {
            id,
            rx,
            topics: Arc::downgrade(&self.topics),
        };
        (SubscriberHandle { id, tx }, mailbox)
    }

    /// Subscribe a mailbox to `topic`; repeated calls are no-ops
    pub fn subscribe(&self, topic: &TopicKey, subscriber: &SubscriberHandle) {
        let mut entries = self.topics.entry(topic.clone()).or_default();
        if !entries.iter().any(|s| s.id == subscriber.id) {
            entries.push(subscriber.clone());
            tracing::debug!(%topic, subscriber = %subscriber.id, "Subscribed");
        }
    }

    pub fn unsubscribe(&self, topic: &TopicKey, subscriber: &SubscriberHandle) {
        if let Some(mut entries) = self.topics.get_mut(topic) {
            entries.retain(|s| s.id != subscriber.id);
        }
        self.topics.remove_if(topic, |_, entries| entries.is_empty());
    }

    /// Deliver `state` to every live subscriber of `topic`
    ///
    /// Returns the number of mailboxes that accepted the update. Never blocks:
    /// a full mailbox loses this delivery.
    pub fn publish(&self, topic: &TopicKey, state: CurrentState) -> usize {
        let Some(mut entries) = self.topics.get_mut(topic) else {
            return 0;
        };
        entries.retain(|s| !s.is_closed());
        if entries.is_empty() {
            drop(entries);
            self.topics.remove_if(topic, |_, entries| entries.is_empty());
            return 0;
        }

        let mut delivered = 0;
        for subscriber in entries.iter() {
            let update = StateUpdate {
                topic: topic.clone(),
                state: state.clone(),
            };
            match subscriber.tx.try_send(update) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%topic, subscriber = %subscriber.id, "Subscriber mailbox full, update dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Live subscribers of `topic`
    pub fn subscriber_count(&self, topic: &TopicKey) -> usize {
        let count = match self.topics.get_mut(topic) {
            Some(mut entries) => {
                entries.retain(|s| !s.is_closed());
                entries.len()
            }
            None => return 0,
        };
        if count == 0 {
            self.topics.remove_if(topic, |_, entries| entries.is_empty());
        }
        count
    }

    pub fn topics(&self) -> Vec<TopicKey> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// Background task feeding a mailbox into a `StateSubscriber`
///
/// Aborted on drop; its subscriptions are removed immediately.
#[derive(Debug)]
pub struct SubscriptionTask {
    id: Uuid,
    join: JoinHandle<()>,
    topics: Weak<Topics>,
}

impl SubscriptionTask {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for SubscriptionTask {
    fn drop(&mut self) {
        self.join.abort();
        if let Some(topics) = self.topics.upgrade() {
            detach(&topics, self.id);
        }
    }
}

/// Subscribe `subscriber` to `topics` and drive it from a spawned task
pub fn spawn_subscriber(
    bus: &StateBus,
    topics: impl IntoIterator<Item = TopicKey>,
    subscriber: Arc<dyn StateSubscriber>,
) -> SubscriptionTask {
    let (handle, mut mailbox) = bus.mailbox();
    for topic in topics {
        bus.subscribe(&topic, &handle);
    }
    // Only the bus keeps senders; the task ends once every topic drops them
    drop(handle);

    let id = mailbox.id();
    let join = tokio::spawn(async move {
        while let Some(update) = mailbox.recv().await {
            subscriber.on_state(update).await;
        }
    });
    SubscriptionTask {
        id,
        join,
        topics: Arc::downgrade(&bus.topics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn bus() -> StateBus {
        StateBus::new(&StateBusConfig::default())
    }

    fn state(topic: &str, n: i64) -> CurrentState {
        CurrentState::new(topic).with("n", n)
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = bus();
        assert_eq!(bus.publish(&TopicKey::new("mcs"), state("mcs", 1)), 0);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_each_subscriber_gets_one_copy() {
        let bus = bus();
        let topic = TopicKey::new("mcs");
        let (a, mut a_box) = bus.mailbox();
        let (b, mut b_box) = bus.mailbox();
        bus.subscribe(&topic, &a);
        bus.subscribe(&topic, &a);
        bus.subscribe(&topic, &b);

        assert_eq!(bus.publish(&topic, state("mcs", 1)), 2);
        assert!(a_box.try_recv().is_some());
        assert!(a_box.try_recv().is_none());
        assert!(b_box.try_recv().is_some());
    }

    #[test]
    fn test_dropped_mailbox_is_purged() {
        let bus = bus();
        let topic = TopicKey::new("enc");
        let (a, a_box) = bus.mailbox();
        bus.subscribe(&topic, &a);
        assert_eq!(bus.subscriber_count(&topic), 1);

        drop(a_box);
        assert!(bus.topics().is_empty());
        assert_eq!(bus.subscriber_count(&topic), 0);
        assert_eq!(bus.publish(&topic, state("enc", 1)), 0);
    }

    #[test]
    fn test_dropped_mailbox_leaves_other_subscribers() {
        let bus = bus();
        let mcs = TopicKey::new("mcs");
        let enc = TopicKey::new("enc");
        let (a, a_box) = bus.mailbox();
        let (b, mut b_box) = bus.mailbox();
        bus.subscribe(&mcs, &a);
        bus.subscribe(&enc, &a);
        bus.subscribe(&mcs, &b);

        drop(a_box);
        assert_eq!(bus.topics(), vec![mcs.clone()]);
        assert_eq!(bus.publish(&mcs, state("mcs", 1)), 1);
        assert!(b_box.try_recv().is_some());
    }

    #[test]
    fn test_closed_senders_do_not_leave_empty_topics() {
        let bus = bus();
        let topic = TopicKey::new("enc");
        let (a, mut a_box) = bus.mailbox();
        bus.subscribe(&topic, &a);
        // Channel closed while the mailbox itself is still alive
        a_box.rx.close();

        assert_eq!(bus.publish(&topic, state("enc", 1)), 0);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_fan_in_and_order_per_topic() {
        let bus = bus();
        let (sub, mut mailbox) = bus.mailbox();
        bus.subscribe(&TopicKey::new("mcs"), &sub);
        bus.subscribe(&TopicKey::new("enc"), &sub);

        bus.publish(&TopicKey::new("mcs"), state("mcs", 1));
        bus.publish(&TopicKey::new("enc"), state("enc", 1));
        bus.publish(&TopicKey::new("mcs"), state("mcs", 2));

        let received: Vec<_> = std::iter::from_fn(|| mailbox.try_recv()).collect();
        assert_eq!(received.len(), 3);
        let mcs: Vec<_> = received
            .iter()
            .filter(|u| u.topic.as_str() == "mcs")
            .map(|u| u.state.get("n").cloned())
            .collect();
        assert_eq!(mcs, vec![Some(1i64.into()), Some(2i64.into())]);
    }

    #[test]
    fn test_full_mailbox_drops_delivery() {
        let bus = StateBus::new(&StateBusConfig {
            mailbox_capacity: 1,
        });
        let topic = TopicKey::new("mcs");
        let (sub, mut mailbox) = bus.mailbox();
        bus.subscribe(&topic, &sub);

        assert_eq!(bus.publish(&topic, state("mcs", 1)), 1);
        assert_eq!(bus.publish(&topic, state("mcs", 2)), 0);
        assert_eq!(mailbox.try_recv().unwrap().state.get("n"), Some(&1i64.into()));
    }

    #[test]
    fn test_unsubscribe() {
        let bus = bus();
        let topic = TopicKey::new("mcs");
        let (sub, _mailbox) = bus.mailbox();
        bus.subscribe(&topic, &sub);
        bus.unsubscribe(&topic, &sub);
        assert_eq!(bus.subscriber_count(&topic), 0);
        assert!(bus.topics().is_empty());
    }

    struct Recorder(Mutex<Vec<StateUpdate>>);

    #[async_trait]
    impl StateSubscriber for Recorder {
        async fn on_state(&self, update: StateUpdate) {
            self.0.lock().unwrap().push(update);
        }
    }

    #[tokio::test]
    async fn test_spawned_subscriber_receives_and_detaches_on_drop() {
        let bus = bus();
        let topic = TopicKey::new("pk");
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let task = spawn_subscriber(&bus, [topic.clone()], recorder.clone());

        bus.publish(&topic, state("pk", 7));
        for _ in 0..10 {
            if !recorder.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(recorder.0.lock().unwrap().len(), 1);

        drop(task);
        assert!(bus.topics().is_empty());
        assert_eq!(bus.subscriber_count(&topic), 0);
    }
}
