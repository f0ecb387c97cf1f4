//! Component Registry - maps ComponentIds to live handles

use crate::config::RegistryConfig;
use crate::runtime_core::handle::{ComponentHandle, WeakComponentHandle};
use dashmap::{DashMap, DashSet};
use std::time::Duration;
use tcs_types::{ComponentId, RegistryError};
use tokio::sync::{broadcast, watch};
use tracing::instrument;

/// Location change observed by Registry subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Announced(ComponentId),
    Withdrawn(ComponentId),
}

/// Registry of every announced component
///
/// Mutation never awaits. Callers blocked in `resolve` park on a change
/// counter and re-check the map whenever it moves. Entries are weak: being
/// announced does not keep a component alive.
pub struct Registry {
    entries: DashMap<ComponentId, WeakComponentHandle>,

    /// Ids withdrawn since their last announcement
    withdrawn: DashSet<ComponentId>,

    changes: watch::Sender<u64>,
    events: broadcast::Sender<RegistryEvent>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: &RegistryConfig) -> Self {
        let (changes, _) = watch::channel(0);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            entries: DashMap::new(),
            withdrawn: DashSet::new(),
            changes,
            events,
            config: config.clone(),
        }
    }

    /// Publish a component's handle; last writer wins
    pub fn announce(&self, handle: &ComponentHandle) {
        let id = handle.id().clone();
        self.withdrawn.remove(&id);
        self.entries.insert(id.clone(), handle.downgrade());
        self.changes.send_modify(|version| *version = version.wrapping_add(1));

        tracing::debug!(component = %id, "Component announced");
        let _ = self.events.send(RegistryEvent::Announced(id));
    }

    /// Remove a component's handle
    ///
    /// Later `resolve` calls fail with `NotFound` until it is announced again.
    pub fn withdraw(&self, id: &ComponentId) {
        self.entries.remove(id);
        self.withdrawn.insert(id.clone());
        self.changes.send_modify(|version| *version = version.wrapping_add(1));

        tracing::debug!(component = %id, "Component withdrawn");
        let _ = self.events.send(RegistryEvent::Withdrawn(id.clone()));
    }

    /// Wait for `id` to be announced, up to `timeout`
    #[instrument(skip(self), fields(component = %id))]
    pub async fn resolve(
        &self,
        id: &ComponentId,
        timeout: Duration,
    ) -> Result<ComponentHandle, RegistryError> {
        // Subscribe before the first lookup so an announce in between is not missed
        let mut changes = self.changes.subscribe();

        let wait = async {
            loop {
                if let Some(handle) = self.find(id) {
                    return Ok(handle);
                }
                if self.withdrawn.contains(id) {
                    return Err(RegistryError::NotFound(id.clone()));
                }
                if changes.changed().await.is_err() {
                    return Err(RegistryError::NotFound(id.clone()));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?timeout, "Resolution timed out");
                Err(RegistryError::ResolutionTimeout {
                    id: id.clone(),
                    timeout,
                })
            }
        }
    }

    /// `resolve` with the configured default timeout
    pub async fn resolve_default(&self, id: &ComponentId) -> Result<ComponentHandle, RegistryError> {
        self.resolve(id, self.config.resolve_timeout()).await
    }

    /// Non-blocking lookup; `None` also when the component is no longer reachable
    pub fn find(&self, id: &ComponentId) -> Option<ComponentHandle> {
        self.entries.get(id).and_then(|entry| entry.upgrade())
    }

    /// Ids currently announced and reachable
    pub fn list(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.upgrade().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stream of announce/withdraw events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}
