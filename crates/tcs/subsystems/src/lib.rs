//! # TCS Subsystems
//!
//! Concrete telescope subsystems on top of `tcs-runtime`:
//!
//! - [`simulator`]: deterministic device stand-ins configured per config key
//! - [`pointing`]: the pointing-kernel boundary and its command processor
//! - [`frontend`]: translation between inbound requests and command sets
//! - [`presets`]: mount, enclosure and pointing wiring
//!
//! ## Example
//!
//! ```no_run
//! use tcs_runtime::{config::RuntimeConfig, TcsRuntime};
//! use tcs_runtime::tcs_types::{Command, CommandSet};
//! use tcs_subsystems::pointing::{KernelError, MountDemand, PointingInput};
//! use tcs_subsystems::TelescopeSlice;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = TcsRuntime::bootstrap(RuntimeConfig::default()).await?;
//!     let kernel = |input: &PointingInput| {
//!         Ok::<_, KernelError>(MountDemand {
//!             mount_az: input.target_ra,
//!             mount_el: input.target_dec,
//!             m3_rotation: 0.0,
//!             m3_tilt: 0.0,
//!         })
//!     };
//!     let slice = TelescopeSlice::start(&runtime, kernel).await?;
//!
//!     let slew = CommandSet::single("slew", Command::new("move").with("az", 10.0).with("el", 5.0));
//!     let status = slice.mount.submit_and_wait(slew).await?;
//!     println!("{:?}", status);
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod frontend;
pub mod pointing;
pub mod presets;
pub mod simulator;

pub use frontend::{serve, FrontendError, JsonTranslator, RequestTranslator};
pub use pointing::{KernelError, MountDemand, PointingController, PointingInput, PointingKernel};
pub use presets::{SliceError, TelescopeSlice};
pub use simulator::{FieldSource, SimulatedDevice, SimulatedResponse, SimulatorConfig};
