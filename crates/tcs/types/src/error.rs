//! Error taxonomy for the TCS coordination core

use crate::ids::{ComponentId, ConfigKey, RunId, TopicKey};
use crate::lifecycle::LifecycleState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a component's initialization hook
///
/// Fatal to the failing component: it stays out of `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Initialization failed: {reason}")]
pub struct InitializationError {
    pub reason: String,
}

impl InitializationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure of a single command at a device, or on the way to it
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CommandError {
    /// Component is not `Running`; retryable
    #[error("Component not ready")]
    NotReady,

    #[error("Unknown command: {0}")]
    UnknownCommand(ConfigKey),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The device accepted the command but could not carry it out
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The component's mailbox is gone
    #[error("Component unavailable: {0}")]
    ComponentUnavailable(ComponentId),

    /// The component does not offer this kind of request
    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

impl CommandError {
    /// Whether the client may reasonably retry the same command later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommandError::NotReady | CommandError::ComponentUnavailable(_)
        )
    }
}

/// Why a submission was rejected before any fan-out
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Empty set or unrecognized key; not retryable
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A required device could not be resolved; retryable once it is announced
    #[error("Dependency unavailable: {component} ({reason})")]
    DependencyUnavailable {
        component: ComponentId,
        reason: String,
    },

    /// The Assembly itself is not `Running`
    #[error("Assembly not ready")]
    NotReady,
}

/// Registry lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Resolution of {id} timed out after {timeout:?}")]
    ResolutionTimeout { id: ComponentId, timeout: Duration },

    #[error("Component not found: {0}")]
    NotFound(ComponentId),
}

/// Lifecycle signalling failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Component unavailable: {0}")]
    ComponentUnavailable(ComponentId),

    #[error("Timed out waiting for {component} to reach {state}")]
    Timeout {
        component: ComponentId,
        state: LifecycleState,
    },
}

/// Failures talking to an Assembly's submission API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Component unavailable: {0}")]
    ComponentUnavailable(ComponentId),

    /// The aggregator went away without reporting a terminal status
    #[error("Completion for {0} was lost")]
    CompletionLost(RunId),

    #[error("Unknown run: {0}")]
    UnknownRun(RunId),

    #[error("Timed out waiting for {0}")]
    Timeout(RunId),
}

/// Telemetry Snapshot Store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Another subscription path already owns this key
    #[error("Snapshot key {0} already has a writer")]
    WriterTaken(TopicKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CommandError::NotReady.is_retryable());
        assert!(!CommandError::UnknownCommand(ConfigKey::new("x")).is_retryable());
        assert!(!CommandError::Execution("jam".into()).is_retryable());
    }

    #[test]
    fn test_messages_name_the_cause() {
        let err = RejectionReason::DependencyUnavailable {
            component: ComponentId::device("mcs"),
            reason: "not found".into(),
        };
        assert_eq!(err.to_string(), "Dependency unavailable: mcs-device (not found)");

        let err = LifecycleError::InvalidTransition {
            from: LifecycleState::InitializeFailed,
            to: LifecycleState::Running,
        };
        assert_eq!(
            err.to_string(),
            "Invalid lifecycle transition: InitializeFailed -> Running"
        );
    }
}
