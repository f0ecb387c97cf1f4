//! Lifecycle supervision for Devices and Assemblies
//!
//! Every component runs inside a Supervisor task that owns its mailbox and
//! its `LifecycleStatus`. Components never change their own state; they only
//! implement the capability traits below.

mod supervisor;

pub use supervisor::Supervisor;

use crate::fabrics::{SnapshotStore, StateBus};
use crate::runtime_core::{Registry, Request};
use crate::telemetry::RuntimeTelemetry;
use async_trait::async_trait;
use std::sync::Arc;
use tcs_types::{ComponentId, InitializationError};

/// Shared services visible to a component
#[derive(Clone)]
pub struct ComponentContext {
    pub id: ComponentId,
    pub registry: Arc<Registry>,
    pub bus: Arc<StateBus>,
    pub snapshots: SnapshotStore,
    pub telemetry: Arc<RuntimeTelemetry>,
}

impl ComponentContext {
    pub fn new(
        id: ComponentId,
        registry: Arc<Registry>,
        bus: Arc<StateBus>,
        snapshots: SnapshotStore,
        telemetry: Arc<RuntimeTelemetry>,
    ) -> Self {
        Self {
            id,
            registry,
            bus,
            snapshots,
            telemetry,
        }
    }

    /// Same services, different component
    pub fn with_id(&self, id: ComponentId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

/// One-shot setup run by the Supervisor before a component is announced
#[async_trait]
pub trait Initializable: Send {
    async fn initialize(&mut self, ctx: &ComponentContext) -> Result<(), InitializationError>;

    /// Runs once on the way to `Terminated`
    async fn on_shutdown(&mut self, _ctx: &ComponentContext) {}
}

/// A supervised component
///
/// `handle` is only called for requests the Supervisor has admitted.
#[async_trait]
pub trait Component: Initializable + 'static {
    async fn handle(&mut self, ctx: &ComponentContext, request: Request);
}
