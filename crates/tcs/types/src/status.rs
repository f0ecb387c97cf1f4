//! Submission status and per-command outcomes

use crate::error::{CommandError, RejectionReason};
use crate::ids::{ComponentId, ConfigKey};
use crate::state::CurrentState;
use serde::{Deserialize, Serialize};

/// Status of a submitted command set
///
/// A client first observes `Accepted` or `Rejected`; an accepted submission
/// later reaches exactly one `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandStatus {
    Rejected(RejectionReason),
    Accepted,
    Completed(CompletionReport),
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Accepted)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, CommandStatus::Accepted)
    }

    pub fn report(&self) -> Option<&CompletionReport> {
        match self {
            CommandStatus::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Aggregate verdict over every sub-command of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overall {
    AllCompleted,
    Incomplete,
}

/// Terminal aggregate for a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub overall: Overall,
    /// One entry per submitted command, in submission order
    pub per_command: Vec<CommandOutcome>,
}

impl CompletionReport {
    pub fn from_outcomes(mut per_command: Vec<CommandOutcome>) -> Self {
        per_command.sort_by_key(|outcome| outcome.index);
        let overall = if per_command.iter().all(CommandOutcome::succeeded) {
            Overall::AllCompleted
        } else {
            Overall::Incomplete
        };
        Self {
            overall,
            per_command,
        }
    }

    pub fn is_all_completed(&self) -> bool {
        self.overall == Overall::AllCompleted
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.per_command.iter().filter(|outcome| !outcome.succeeded())
    }
}

/// Outcome of one forwarded sub-command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Position in the submitted command set
    pub index: usize,
    pub config_key: ConfigKey,
    /// Device the command was routed to
    pub target: Option<ComponentId>,
    pub result: OutcomeResult,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, OutcomeResult::Completed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutcomeResult {
    /// Device finished and published this state
    Completed(CurrentState),
    /// Device (or the path to it) reported a failure
    Failed(CommandError),
    /// No answer before the aggregate deadline
    TimedOut,
    /// The owning Assembly shut down before an answer arrived
    Abandoned,
}
