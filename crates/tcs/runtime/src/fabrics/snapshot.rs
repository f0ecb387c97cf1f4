//! Telemetry Snapshot Store - last value per key, one writer per key

use super::state_bus::{spawn_subscriber, StateBus, StateSubscriber, SubscriptionTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tcs_types::{CurrentState, SnapshotError, StateUpdate, TopicKey};
use uuid::Uuid;

/// Latest value held for a key
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: Arc<CurrentState>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    values: DashMap<TopicKey, Snapshot>,
    /// Claim token of the writer that owns each key
    writers: DashMap<TopicKey, Uuid>,
}

/// Shared last-value cache
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<StoreInner>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single writer slot for `topic`
    pub fn writer(&self, topic: &TopicKey) -> Result<SnapshotWriter, SnapshotError> {
        let token = Uuid::new_v4();
        match self.inner.writers.entry(topic.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SnapshotError::WriterTaken(topic.clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(token);
                Ok(SnapshotWriter {
                    store: self.clone(),
                    topic: topic.clone(),
                    token,
                })
            }
        }
    }

    pub fn latest(&self, topic: &TopicKey) -> Option<Snapshot> {
        self.inner.values.get(topic).map(|entry| entry.clone())
    }

    /// Latest state only, without the timestamp
    pub fn state(&self, topic: &TopicKey) -> Option<Arc<CurrentState>> {
        self.inner.values.get(topic).map(|entry| entry.state.clone())
    }

    pub fn keys(&self) -> Vec<TopicKey> {
        self.inner.values.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Keep `topic`'s snapshot current from the State Bus
    pub fn feed(&self, bus: &StateBus, topic: &TopicKey) -> Result<SubscriptionTask, SnapshotError> {
        let writer = self.writer(topic)?;
        tracing::debug!(%topic, "Snapshot feed started");
        Ok(spawn_subscriber(bus, [topic.clone()], Arc::new(writer)))
    }
}

/// Exclusive write access to one key; released on drop
pub struct SnapshotWriter {
    store: SnapshotStore,
    topic: TopicKey,
    token: Uuid,
}

impl SnapshotWriter {
    pub fn topic(&self) -> &TopicKey {
        &self.topic
    }

    /// Replace the stored value
    pub fn write(&self, state: CurrentState) {
        self.store.inner.values.insert(
            self.topic.clone(),
            Snapshot {
                state: Arc::new(state),
                updated_at: Utc::now(),
            },
        );
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        let token = self.token;
        self.store
            .inner
            .writers
            .remove_if(&self.topic, |_, owner| *owner == token);
    }
}

#[async_trait]
impl StateSubscriber for SnapshotWriter {
    async fn on_state(&self, update: StateUpdate) {
        if update.topic == self.topic {
            self.write(update.state);
        }
    }
}
