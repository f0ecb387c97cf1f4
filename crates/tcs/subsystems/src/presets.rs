//! Mount, enclosure and pointing wiring
//!
//! | Assembly | Device | Keys                      |
//! |----------|--------|---------------------------|
//! | `mcs`    | `mcs`  | `move`, `offset`, `follow` |
//! | `enc`    | `enc`  | `move`, `follow`          |
//! | `tcs`    | `pk`   | `setTarget`               |

use crate::pointing::{PointingController, PointingKernel, SET_TARGET};
use crate::simulator::{SimulatedDevice, SimulatedResponse, SimulatorConfig};
use tcs_runtime::config::{AssemblyConfig, DeviceConfig};
use tcs_runtime::{ComponentHandle, RuntimeError, TcsRuntime};
use tcs_types::{ComponentId, LifecycleError, TopicKey};
use thiserror::Error;

pub const MOUNT: &str = "mcs";
pub const ENCLOSURE: &str = "enc";
pub const POINTING: &str = "pk";
pub const POINTING_ASSEMBLY: &str = "tcs";

pub fn mount_device() -> DeviceConfig {
    DeviceConfig::new(MOUNT)
}

pub fn enclosure_device() -> DeviceConfig {
    DeviceConfig::new(ENCLOSURE)
}

pub fn pointing_device() -> DeviceConfig {
    DeviceConfig::new(POINTING)
}

/// Mount simulator: idle on every key, `move` also reports `az`/`el`
pub fn mount_simulator() -> SimulatorConfig {
    SimulatorConfig::idle(["offset", "follow"])
        .respond("move", SimulatedResponse::idle().echo("az").echo("el"))
}

/// Enclosure simulator: `move` reports `base`/`cap`
pub fn enclosure_simulator() -> SimulatorConfig {
    SimulatorConfig::idle(["follow"])
        .respond("move", SimulatedResponse::idle().echo("base").echo("cap"))
}

pub fn mount_assembly() -> AssemblyConfig {
    AssemblyConfig::new(MOUNT)
        .route("move", MOUNT)
        .route("offset", MOUNT)
        .route("follow", MOUNT)
}

pub fn enclosure_assembly() -> AssemblyConfig {
    AssemblyConfig::new(ENCLOSURE)
        .route("move", ENCLOSURE)
        .route("follow", ENCLOSURE)
}

pub fn pointing_assembly() -> AssemblyConfig {
    AssemblyConfig::new(POINTING_ASSEMBLY).route(SET_TARGET, POINTING)
}

#[derive(Debug, Error)]
pub enum SliceError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Component {component} did not start: {source}")]
    Start {
        component: ComponentId,
        source: LifecycleError,
    },
}

/// Assembly handles of a running slice
#[derive(Debug, Clone)]
pub struct TelescopeSlice {
    pub mount: ComponentHandle,
    pub enclosure: ComponentHandle,
    pub pointing: ComponentHandle,
}

impl TelescopeSlice {
    /// Spawn simulators, the pointing controller and their assemblies, then run them
    ///
    /// Mount and enclosure states are fed into the Snapshot Store so the
    /// pointing controller can read the current mount position.
    pub async fn start<K>(runtime: &TcsRuntime, kernel: K) -> Result<Self, SliceError>
    where
        K: PointingKernel + 'static,
    {
        runtime
            .spawn_device(&mount_device(), SimulatedDevice::new(mount_simulator()))
            .await?;
        runtime
            .spawn_device(&enclosure_device(), SimulatedDevice::new(enclosure_simulator()))
            .await?;
        runtime
            .spawn_device(
                &pointing_device(),
                PointingController::new(kernel, mount_device().topic()),
            )
            .await?;

        runtime.feed_snapshot(&mount_device().topic())?;
        runtime.feed_snapshot(&enclosure_device().topic())?;
        runtime.feed_snapshot(&TopicKey::new(POINTING))?;

        let slice = Self {
            mount: runtime.spawn_assembly(mount_assembly()).await?,
            enclosure: runtime.spawn_assembly(enclosure_assembly()).await?,
            pointing: runtime.spawn_assembly(pointing_assembly()).await?,
        };

        for (component, result) in runtime.run_all().await {
            if let Err(source) = result {
                return Err(SliceError::Start { component, source });
            }
        }

        tracing::info!("Telescope slice running");
        Ok(slice)
    }
}
