//! Component lifecycle state machine
//!
//! ```text
//! Uninitialized -> Initializing -> Initialized -> Running -> ShuttingDown -> Terminated
//!                              \                \________________/^
//!                               -> InitializeFailed (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    InitializeFailed,
    Initialized,
    Running,
    ShuttingDown,
    Terminated,
}

impl LifecycleState {
    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Initialized)
                | (Initializing, InitializeFailed)
                | (Initialized, Running)
                | (Initialized, ShuttingDown)
                | (Running, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }

    /// No further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::InitializeFailed | LifecycleState::Terminated
        )
    }

    pub fn is_running(self) -> bool {
        self == LifecycleState::Running
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Observable lifecycle status of a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStatus {
    pub state: LifecycleState,
    /// Set only together with [`LifecycleState::InitializeFailed`]
    pub failure: Option<String>,
}

impl LifecycleStatus {
    pub fn new(state: LifecycleState) -> Self {
        Self {
            state,
            failure: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: LifecycleState::InitializeFailed,
            failure: Some(reason.into()),
        }
    }
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        Self::new(LifecycleState::Uninitialized)
    }
}
