//! TCS Runtime Core
//!
//! Owns the shared services (Registry, State Bus, Snapshot Store, telemetry)
//! and the handles through which supervised components are reached.

pub mod handle;
mod registry;
pub mod runtime;

pub use handle::{ComponentHandle, Request, Submission, WeakComponentHandle};
pub use registry::{Registry, RegistryEvent};
pub use runtime::{RuntimeError, TcsRuntime};
