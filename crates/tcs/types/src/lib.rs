//! # TCS Types - Core data model for telescope command coordination
//!
//! Shared by every crate of the workspace:
//!
//! - **Identity**: [`ComponentId`], [`Connection`], [`ConfigKey`], [`TopicKey`], [`RunId`]
//! - **Commands**: [`Command`], [`CommandSet`], typed [`ParamValue`]s
//! - **Status**: the two-stage [`CommandStatus`] and its [`CompletionReport`]
//! - **State**: [`CurrentState`] published by devices
//! - **Lifecycle**: [`LifecycleState`] and its transition rules
//! - **Errors**: the failure taxonomy surfaced to clients and components

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod command;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod state;
pub mod status;

pub use command::{Command, CommandSet, ParamValue, Parameters};
pub use error::{
    CommandError, InitializationError, LifecycleError, RegistryError, RejectionReason,
    SnapshotError, SubmitError,
};
pub use ids::{ComponentId, ComponentKind, ConfigKey, Connection, ConnectionKind, RunId, TopicKey};
pub use lifecycle::{LifecycleState, LifecycleStatus};
pub use state::{CurrentState, StateUpdate};
pub use status::{CommandOutcome, CommandStatus, CompletionReport, OutcomeResult, Overall};
