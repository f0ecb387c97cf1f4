//! Main TCS runtime implementation

use crate::assembly::Assembly;
use crate::config::{AssemblyConfig, ConfigError, DeviceConfig, RuntimeConfig};
use crate::device::{CommandProcessor, DeviceController};
use crate::fabrics::{SnapshotStore, StateBus, SubscriptionTask};
use crate::lifecycle::{Component, ComponentContext, Initializable, Supervisor};
use crate::runtime_core::{ComponentHandle, Registry};
use crate::telemetry::RuntimeTelemetry;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tcs_types::{ComponentId, ComponentKind, LifecycleError, LifecycleState, SnapshotError, TopicKey};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Runtime-level failures
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Component already exists: {0}")]
    DuplicateComponent(ComponentId),

    #[error("Runtime is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// The TCS coordination runtime
///
/// Owns the Registry, State Bus, Snapshot Store and telemetry, and every
/// component spawned through it. Cloning shares the same runtime.
#[derive(Clone)]
pub struct TcsRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,

    registry: Arc<Registry>,
    bus: Arc<StateBus>,
    snapshots: SnapshotStore,
    telemetry: Arc<RuntimeTelemetry>,

    components: DashMap<ComponentId, Supervised>,
    feeds: DashMap<TopicKey, SubscriptionTask>,

    shutdown: RwLock<bool>,
}

struct Supervised {
    handle: ComponentHandle,
    join: JoinHandle<()>,
}

impl TcsRuntime {
    /// Bootstrap the runtime services
    ///
    /// No component is started here; use `spawn_device` / `spawn_assembly`,
    /// then `run_all`.
    ///
    /// ```no_run
    /// use tcs_runtime::{TcsRuntime, config::RuntimeConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let runtime = TcsRuntime::bootstrap(RuntimeConfig::default()).await?;
    /// runtime.shutdown().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bootstrap(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        tracing::info!("Bootstrapping TCS runtime");
        config.validate()?;

        let registry = Arc::new(Registry::new(&config.registry));
        let bus = Arc::new(StateBus::new(&config.state_bus));
        let snapshots = SnapshotStore::new();
        let telemetry = Arc::new(RuntimeTelemetry::new(&config.telemetry));

        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                config,
                registry,
                bus,
                snapshots,
                telemetry,
                components: DashMap::new(),
                feeds: DashMap::new(),
                shutdown: RwLock::new(false),
            }),
        };

        tracing::info!("TCS runtime bootstrapped");
        Ok(runtime)
    }

    /// Start a Device Controller around `processor`
    pub async fn spawn_device<P>(
        &self,
        device: &DeviceConfig,
        processor: P,
    ) -> Result<ComponentHandle, RuntimeError>
    where
        P: CommandProcessor + Initializable + 'static,
    {
        let controller = DeviceController::new(device.topic(), processor);
        self.spawn_component(device.id(), controller).await
    }

    /// Start an Assembly
    pub async fn spawn_assembly(&self, config: AssemblyConfig) -> Result<ComponentHandle, RuntimeError> {
        config.validate()?;
        let id = config.id();
        let assembly = Assembly::new(config, &self.inner.config);
        self.spawn_component(id, assembly).await
    }

    /// Start every assembly listed in the runtime configuration
    pub async fn spawn_configured_assemblies(&self) -> Result<Vec<ComponentHandle>, RuntimeError> {
        let mut handles = Vec::with_capacity(self.inner.config.assemblies.len());
        for assembly in self.inner.config.assemblies.clone() {
            handles.push(self.spawn_assembly(assembly).await?);
        }
        Ok(handles)
    }

    async fn spawn_component<C: Component>(
        &self,
        id: ComponentId,
        component: C,
    ) -> Result<ComponentHandle, RuntimeError> {
        if self.is_shutting_down().await {
            return Err(RuntimeError::ShuttingDown);
        }
        self.prune();
        if self.inner.components.contains_key(&id) {
            return Err(RuntimeError::DuplicateComponent(id));
        }

        let ctx = ComponentContext::new(
            id.clone(),
            self.inner.registry.clone(),
            self.inner.bus.clone(),
            self.inner.snapshots.clone(),
            self.inner.telemetry.clone(),
        );
        let (handle, join) = Supervisor::spawn(component, ctx, &self.inner.config.lifecycle);
        self.inner.components.insert(
            id.clone(),
            Supervised {
                handle: handle.clone(),
                join,
            },
        );

        tracing::info!(component = %id, "Component spawned");
        Ok(handle)
    }

    /// Keep the Snapshot Store's `topic` entry current from the State Bus
    pub fn feed_snapshot(&self, topic: &TopicKey) -> Result<(), RuntimeError> {
        let task = self.inner.snapshots.feed(&self.inner.bus, topic)?;
        self.inner.feeds.insert(topic.clone(), task);
        Ok(())
    }

    /// Signal `Run` to every component once it is `Initialized`
    ///
    /// Devices go first. Components that fail to initialize are reported and
    /// left out of `Running`.
    pub async fn run_all(&self) -> Vec<(ComponentId, Result<(), LifecycleError>)> {
        let timeout = self.inner.config.lifecycle.init_timeout();
        let mut results = Vec::new();

        for handle in self.handles_in(&[ComponentKind::Device, ComponentKind::Assembly]) {
            let result = match handle.state() {
                LifecycleState::Running => Ok(()),
                _ => match handle.wait_for(LifecycleState::Initialized, timeout).await {
                    Ok(()) => handle.run().await,
                    Err(e) => Err(e),
                },
            };
            if let Err(e) = &result {
                tracing::error!(component = %handle.id(), error = %e, "Component did not start");
            }
            results.push((handle.id().clone(), result));
        }
        results
    }

    /// Shut every component down: assemblies first, then devices
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut shutdown = self.inner.shutdown.write().await;
            if *shutdown {
                tracing::warn!("Runtime already shut down");
                return;
            }
            *shutdown = true;
        }
        tracing::info!("Shutting down TCS runtime");

        for kind in [ComponentKind::Assembly, ComponentKind::Device] {
            let ids: Vec<ComponentId> = self
                .inner
                .components
                .iter()
                .filter(|entry| entry.key().kind == kind)
                .map(|entry| entry.key().clone())
                .collect();
            let supervised: Vec<Supervised> = ids
                .iter()
                .filter_map(|id| self.inner.components.remove(id).map(|(_, s)| s))
                .collect();

            join_all(supervised.into_iter().map(|s| async move {
                if let Err(e) = s.handle.shutdown().await {
                    tracing::debug!(component = %s.handle.id(), error = %e, "Component already stopped");
                }
                if let Err(e) = s.join.await {
                    tracing::error!(component = %s.handle.id(), error = %e, "Supervisor task failed");
                }
            }))
            .await;
        }

        self.inner.feeds.clear();
        self.inner.telemetry.flush().await;
        tracing::info!("TCS runtime shutdown complete");
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.read().await
    }

    /// Handle of a component spawned by this runtime
    pub fn handle(&self, id: &ComponentId) -> Option<ComponentHandle> {
        self.inner.components.get(id).map(|s| s.handle.clone())
    }

    pub fn assembly(&self, name: &str) -> Option<ComponentHandle> {
        self.handle(&ComponentId::assembly(name))
    }

    pub fn device(&self, name: &str) -> Option<ComponentHandle> {
        self.handle(&ComponentId::device(name))
    }

    /// Components that have not reached an end state
    pub fn components(&self) -> Vec<ComponentId> {
        self.prune();
        let mut ids: Vec<_> = self
            .inner
            .components
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn bus(&self) -> &Arc<StateBus> {
        &self.inner.bus
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.inner.snapshots
    }

    pub fn telemetry(&self) -> &Arc<RuntimeTelemetry> {
        &self.inner.telemetry
    }

    /// Forget components that are `Terminated` or `InitializeFailed`
    fn prune(&self) {
        self.inner.components.retain(|id, supervised| {
            let done = supervised.handle.state().is_terminal();
            if done {
                tracing::debug!(component = %id, state = %supervised.handle.state(), "Pruning finished component");
            }
            !done
        });
    }

    fn handles_in(&self, order: &[ComponentKind]) -> Vec<ComponentHandle> {
        let mut handles: Vec<ComponentHandle> = self
            .inner
            .components
            .iter()
            .map(|entry| entry.handle.clone())
            .collect();
        handles.sort_by_key(|h| {
            let rank = order.iter().position(|k| *k == h.id().kind).unwrap_or(order.len());
            (rank, h.id().name.clone())
        });
        handles
    }
}
