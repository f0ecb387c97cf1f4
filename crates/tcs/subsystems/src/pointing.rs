//! Pointing kernel boundary and the controller that drives it
//!
//! The kernel itself is an external collaborator: it turns the current mount
//! position and a sky target into demands. This module only routes its inputs
//! from the Snapshot Store and its outputs onto the command/state paths.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tcs_runtime::{CommandProcessor, ComponentContext, Initializable};
use tcs_types::{
    Command, CommandError, ConfigKey, InitializationError, ParamValue, Parameters, TopicKey,
};
use thiserror::Error;

pub const SET_TARGET: &str = "setTarget";

/// Inputs to one demand computation, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointingInput {
    pub mount_az: f64,
    pub mount_el: f64,
    pub target_ra: f64,
    pub target_dec: f64,
}

/// Demands produced by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MountDemand {
    pub mount_az: f64,
    pub mount_el: f64,
    pub m3_rotation: f64,
    pub m3_tilt: f64,
}

impl MountDemand {
    fn into_fields(self) -> Parameters {
        [
            ("mount_az", self.mount_az),
            ("mount_el", self.mount_el),
            ("m3_rotation", self.m3_rotation),
            ("m3_tilt", self.m3_tilt),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), ParamValue::Double(value)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("Pointing kernel unavailable: {0}")]
    Unavailable(String),

    #[error("Target unreachable: {0}")]
    Unreachable(String),
}

/// Opaque demand computation
pub trait PointingKernel: Send + Sync {
    fn compute_demand(&self, input: &PointingInput) -> Result<MountDemand, KernelError>;
}

impl<F> PointingKernel for F
where
    F: Fn(&PointingInput) -> Result<MountDemand, KernelError> + Send + Sync,
{
    fn compute_demand(&self, input: &PointingInput) -> Result<MountDemand, KernelError> {
        self(input)
    }
}

/// Handles `setTarget{ra, dec}` by asking the kernel for demands
///
/// The current mount position is read from the Snapshot Store under
/// `mount_topic`; a mount that has not published yet counts as `az = el = 0`.
pub struct PointingController<K> {
    kernel: K,
    mount_topic: TopicKey,
}

impl<K: PointingKernel> PointingController<K> {
    pub fn new(kernel: K, mount_topic: impl Into<TopicKey>) -> Self {
        Self {
            kernel,
            mount_topic: mount_topic.into(),
        }
    }

    fn input(&self, ctx: &ComponentContext, command: &Command) -> Result<PointingInput, CommandError> {
        let target_ra = command.double("ra")?;
        let target_dec = command.double("dec")?;
        let mount = ctx.snapshots.state(&self.mount_topic);
        let position = |name: &str| mount.as_ref().and_then(|s| s.double(name)).unwrap_or(0.0);

        Ok(PointingInput {
            mount_az: position("az"),
            mount_el: position("el"),
            target_ra,
            target_dec,
        })
    }
}

#[async_trait]
impl<K: PointingKernel> Initializable for PointingController<K> {
    async fn initialize(&mut self, _ctx: &ComponentContext) -> Result<(), InitializationError> {
        tracing::debug!(mount_topic = %self.mount_topic, "Pointing controller ready");
        Ok(())
    }
}

#[async_trait]
impl<K: PointingKernel> CommandProcessor for PointingController<K> {
    fn recognizes(&self, key: &ConfigKey) -> bool {
        key.as_str() == SET_TARGET
    }

    async fn execute(
        &mut self,
        ctx: &ComponentContext,
        command: &Command,
    ) -> Result<Parameters, CommandError> {
        let input = self.input(ctx, command)?;
        let demand = self.kernel.compute_demand(&input).map_err(|e| {
            tracing::warn!(error = %e, ?input, "Pointing kernel failed");
            CommandError::Execution(e.to_string())
        })?;
        Ok(demand.into_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_kernel(input: &PointingInput) -> Result<MountDemand, KernelError> {
        if input.target_dec > 90.0 {
            return Err(KernelError::Unreachable(format!("dec {}", input.target_dec)));
        }
        Ok(MountDemand {
            mount_az: input.mount_az + input.target_ra,
            mount_el: input.mount_el + input.target_dec,
            m3_rotation: 0.5,
            m3_tilt: 0.25,
        })
    }

    #[test]
    fn test_functions_are_kernels() {
        let demand = offset_kernel
            .compute_demand(&PointingInput {
                mount_az: 1.0,
                mount_el: 2.0,
                target_ra: 10.0,
                target_dec: 20.0,
            })
            .unwrap();
        assert_eq!(demand.mount_az, 11.0);
        assert_eq!(demand.mount_el, 22.0);
    }

    #[test]
    fn test_demand_fields() {
        let fields = MountDemand {
            mount_az: 1.0,
            mount_el: 2.0,
            m3_rotation: 3.0,
            m3_tilt: 4.0,
        }
        .into_fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get("m3_tilt"), Some(&ParamValue::Double(4.0)));
    }

    #[test]
    fn test_only_set_target_recognized() {
        let controller = PointingController::new(offset_kernel, "mcs");
        assert!(controller.recognizes(&ConfigKey::new("setTarget")));
        assert!(!controller.recognizes(&ConfigKey::new("move")));
    }
}
