//! # TCS Coordination Runtime
//!
//! Command dispatch and lifecycle coordination for a telescope control
//! vertical slice.
//!
//! ## Overview
//!
//! Clients submit command sets to an **Assembly**. The Assembly validates
//! them, resolves the **Device Controllers** it depends on through the
//! **Registry**, fans the commands out concurrently and reports a single
//! aggregate per submission. Devices publish every resulting state on the
//! **State Bus**; interested parties cache the latest values in the
//! **Snapshot Store**.
//!
//! ```text
//!  client --submit--> Assembly --command--> Device Controller --publish--> State Bus
//!     ^                  |   \                                               |
//!     |   Accepted       |    resolve                                        v
//!     +--- Completed ----+      |                                    Snapshot Store
//!                            Registry
//! ```
//!
//! Every component runs under a Supervisor:
//! `Uninitialized -> Initializing -> Initialized -> Running -> ShuttingDown -> Terminated`,
//! with `InitializeFailed` as the only other end state. Anything sent to a
//! component that is not `Running` is answered `NotReady`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tcs_runtime::{TcsRuntime, config::{AssemblyConfig, RuntimeConfig}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = TcsRuntime::bootstrap(RuntimeConfig::default()).await?;
//!
//!     let _mount = runtime
//!         .spawn_assembly(AssemblyConfig::new("mcs").route("move", "mcs"))
//!         .await?;
//!
//!     // Devices are spawned the same way with a CommandProcessor
//!     runtime.run_all().await;
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod assembly;
pub mod config;
pub mod device;
pub mod fabrics;
pub mod lifecycle;
pub mod runtime_core;
pub mod telemetry;

pub use assembly::{Assembly, CommandResponseManager, RoutingTable};
pub use device::{CommandProcessor, DeviceController};
pub use fabrics::{
    spawn_subscriber, Snapshot, SnapshotStore, SnapshotWriter, StateBus, StateSubscriber,
    SubscriptionTask,
};
pub use lifecycle::{Component, ComponentContext, Initializable, Supervisor};
pub use runtime_core::{
    ComponentHandle, Registry, RegistryEvent, Request, RuntimeError, Submission, TcsRuntime,
    WeakComponentHandle,
};
pub use tcs_types;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[tokio::test]
    async fn test_runtime_bootstrap() {
        let runtime = TcsRuntime::bootstrap(RuntimeConfig::default()).await;
        assert!(runtime.is_ok());
    }

    #[tokio::test]
    async fn test_runtime_shutdown() {
        let runtime = TcsRuntime::bootstrap(RuntimeConfig::default())
            .await
            .unwrap();
        runtime.shutdown().await;
        assert!(runtime.is_shutting_down().await);
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_refused() {
        let runtime = TcsRuntime::bootstrap(RuntimeConfig::default())
            .await
            .unwrap();
        runtime.shutdown().await;
        let err = runtime
            .spawn_assembly(config::AssemblyConfig::new("mcs").route("move", "mcs"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ShuttingDown));
    }
}
