//! Handles for talking to supervised components

use std::time::Duration;
use tcs_types::{
    Command, CommandError, CommandSet, CommandStatus, ComponentId, CurrentState, LifecycleError,
    LifecycleState, LifecycleStatus, RejectionReason, RunId, SubmitError,
};
use tokio::sync::{mpsc, oneshot, watch};

/// Messages accepted by a component's Supervisor loop
pub(crate) enum ComponentMessage {
    Run {
        reply: oneshot::Sender<Result<(), LifecycleError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), LifecycleError>>,
    },
    Request(Request),
}

/// Work delivered to a component once its Supervisor lets it through
pub enum Request {
    /// A single command for a Device Controller
    Command {
        command: Command,
        reply: oneshot::Sender<Result<CurrentState, CommandError>>,
    },
    /// A command set for an Assembly
    Submit {
        set: CommandSet,
        reply: oneshot::Sender<Submission>,
    },
    /// Validation only, no fan-out
    Validate {
        set: CommandSet,
        reply: oneshot::Sender<CommandStatus>,
    },
    /// Status of an earlier submission
    Query {
        run_id: RunId,
        reply: oneshot::Sender<Option<watch::Receiver<CommandStatus>>>,
    },
}

impl Request {
    /// Whether the request needs the component to be `Running`
    pub fn requires_running(&self) -> bool {
        !matches!(self, Request::Query { .. })
    }

    /// Answer without side effects: the component is not `Running`
    ///
    /// Refused submissions get a fresh run id that is never recorded, so
    /// `query` on it reports `UnknownRun`; the returned `Submission` already
    /// carries the terminal `Rejected(NotReady)`.
    pub fn reject_not_ready(self) {
        match self {
            Request::Command { reply, .. } => {
                let _ = reply.send(Err(CommandError::NotReady));
            }
            Request::Submit { reply, .. } => {
                let _ = reply.send(Submission::rejected(
                    RunId::generate(),
                    RejectionReason::NotReady,
                ));
            }
            Request::Validate { reply, .. } => {
                let _ = reply.send(CommandStatus::Rejected(RejectionReason::NotReady));
            }
            Request::Query { reply, .. } => {
                let _ = reply.send(None);
            }
        }
    }

    /// Answer a request kind this component does not offer
    pub fn reject_unsupported(self, component: &ComponentId) {
        let reason = format!("{} does not accept this request", component);
        match self {
            Request::Command { reply, .. } => {
                let _ = reply.send(Err(CommandError::Unsupported(reason)));
            }
            Request::Submit { reply, .. } => {
                let _ = reply.send(Submission::rejected(
                    RunId::generate(),
                    RejectionReason::InvalidCommand(reason),
                ));
            }
            Request::Validate { reply, .. } => {
                let _ = reply.send(CommandStatus::Rejected(RejectionReason::InvalidCommand(
                    reason,
                )));
            }
            Request::Query { reply, .. } => {
                let _ = reply.send(None);
            }
        }
    }
}

/// First-stage answer to a submission
///
/// Carries `Accepted` or `Rejected`; an accepted submission also carries the
/// future terminal status, so the client cannot observe completion before
/// acceptance.
#[derive(Debug)]
pub struct Submission {
    pub run_id: RunId,
    pub status: CommandStatus,
    completion: Option<oneshot::Receiver<CommandStatus>>,
}

impl Submission {
    pub(crate) fn accepted(run_id: RunId, completion: oneshot::Receiver<CommandStatus>) -> Self {
        Self {
            run_id,
            status: CommandStatus::Accepted,
            completion: Some(completion),
        }
    }

    pub(crate) fn rejected(run_id: RunId, reason: RejectionReason) -> Self {
        Self {
            run_id,
            status: CommandStatus::Rejected(reason),
            completion: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }

    /// Wait for the terminal status
    ///
    /// A rejection is already terminal and is returned as-is.
    pub async fn completion(self) -> Result<CommandStatus, SubmitError> {
        let Submission {
            run_id,
            status,
            completion,
        } = self;
        match completion {
            None => Ok(status),
            Some(rx) => rx.await.map_err(|_| SubmitError::CompletionLost(run_id)),
        }
    }
}

/// Handle to a supervised component
///
/// Cheap to clone; this is what the Registry hands out. The component shuts
/// itself down once every handle is dropped.
#[derive(Clone)]
pub struct ComponentHandle {
    id: ComponentId,
    tx: mpsc::Sender<ComponentMessage>,
    status: watch::Receiver<LifecycleStatus>,
}

impl std::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl ComponentHandle {
    pub(crate) fn new(
        id: ComponentId,
        tx: mpsc::Sender<ComponentMessage>,
        status: watch::Receiver<LifecycleStatus>,
    ) -> Self {
        Self { id, tx, status }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.borrow().state
    }

    pub(crate) fn status_receiver(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.clone()
    }

    /// A handle that does not keep the component alive
    pub fn downgrade(&self) -> WeakComponentHandle {
        WeakComponentHandle {
            id: self.id.clone(),
            tx: self.tx.downgrade(),
            status: self.status.clone(),
        }
    }

    /// Wait until the component reaches `target`
    ///
    /// Fails early if the component ends up in a state from which `target`
    /// can no longer be reached.
    pub async fn wait_for(
        &self,
        target: LifecycleState,
        timeout: Duration,
    ) -> Result<(), LifecycleError> {
        let mut status = self.status.clone();
        let waited = tokio::time::timeout(
            timeout,
            status.wait_for(|s| s.state == target || s.state.is_terminal()),
        )
        .await;

        let current = match waited {
            Ok(Ok(current)) => current.clone(),
            Ok(Err(_)) => self.status(),
            Err(_) => {
                return Err(LifecycleError::Timeout {
                    component: self.id.clone(),
                    state: target,
                })
            }
        };

        if current.state == target {
            return Ok(());
        }
        match current.state {
            LifecycleState::InitializeFailed => Err(LifecycleError::InitializationFailed(
                current.failure.unwrap_or_default(),
            )),
            _ => Err(LifecycleError::ComponentUnavailable(self.id.clone())),
        }
    }

    /// Signal `Run`: `Initialized -> Running`
    pub async fn run(&self) -> Result<(), LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.send(ComponentMessage::Run { reply })
            .await
            .map_err(|_| LifecycleError::ComponentUnavailable(self.id.clone()))?;
        rx.await
            .map_err(|_| LifecycleError::ComponentUnavailable(self.id.clone()))?
    }

    /// Signal `Shutdown`; resolves once the component is `Terminated`
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.send(ComponentMessage::Shutdown { reply })
            .await
            .map_err(|_| LifecycleError::ComponentUnavailable(self.id.clone()))?;
        rx.await
            .map_err(|_| LifecycleError::ComponentUnavailable(self.id.clone()))?
    }

    /// Send one command to a Device Controller and wait for its resulting state
    pub async fn command(&self, command: Command) -> Result<CurrentState, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(ComponentMessage::Request(Request::Command { command, reply }))
            .await
            .map_err(|_| CommandError::ComponentUnavailable(self.id.clone()))?;
        rx.await
            .map_err(|_| CommandError::ComponentUnavailable(self.id.clone()))?
    }

    /// Submit a command set to an Assembly
    pub async fn submit(&self, set: CommandSet) -> Result<Submission, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(ComponentMessage::Request(Request::Submit { set, reply }))
            .await
            .map_err(|_| SubmitError::ComponentUnavailable(self.id.clone()))?;
        rx.await
            .map_err(|_| SubmitError::ComponentUnavailable(self.id.clone()))
    }

    /// Submit and wait for the terminal status
    pub async fn submit_and_wait(&self, set: CommandSet) -> Result<CommandStatus, SubmitError> {
        self.submit(set).await?.completion().await
    }

    /// Check a command set against the Assembly's routes without executing it
    pub async fn validate(&self, set: CommandSet) -> Result<CommandStatus, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(ComponentMessage::Request(Request::Validate { set, reply }))
            .await
            .map_err(|_| SubmitError::ComponentUnavailable(self.id.clone()))?;
        rx.await
            .map_err(|_| SubmitError::ComponentUnavailable(self.id.clone()))
    }

    /// Latest recorded status of a submission
    pub async fn query(&self, run_id: RunId) -> Result<CommandStatus, SubmitError> {
        let status = self.watch_run(run_id).await?;
        let current = status.borrow().clone();
        Ok(current)
    }

    /// Wait for the terminal status of a submission
    pub async fn query_final(
        &self,
        run_id: RunId,
        timeout: Duration,
    ) -> Result<CommandStatus, SubmitError> {
        let mut status = self.watch_run(run_id).await?;
        let result =
            match tokio::time::timeout(timeout, status.wait_for(CommandStatus::is_terminal)).await {
                Ok(Ok(terminal)) => Ok(terminal.clone()),
                Ok(Err(_)) => Err(SubmitError::CompletionLost(run_id)),
                Err(_) => Err(SubmitError::Timeout(run_id)),
            };
        result
    }

    async fn watch_run(&self, run_id: RunId) -> Result<watch::Receiver<CommandStatus>, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(ComponentMessage::Request(Request::Query { run_id, reply }))
            .await
            .map_err(|_| SubmitError::ComponentUnavailable(self.id.clone()))?;
        rx.await
            .map_err(|_| SubmitError::ComponentUnavailable(self.id.clone()))?
            .ok_or(SubmitError::UnknownRun(run_id))
    }

    async fn send(
        &self,
        message: ComponentMessage,
    ) -> Result<(), mpsc::error::SendError<ComponentMessage>> {
        self.tx.send(message).await
    }
}

/// Non-owning reference to a component, as kept by the Registry
#[derive(Clone)]
pub struct WeakComponentHandle {
    id: ComponentId,
    tx: mpsc::WeakSender<ComponentMessage>,
    status: watch::Receiver<LifecycleStatus>,
}

impl WeakComponentHandle {
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// `None` once every strong handle is gone
    pub fn upgrade(&self) -> Option<ComponentHandle> {
        let tx = self.tx.upgrade()?;
        Some(ComponentHandle::new(self.id.clone(), tx, self.status.clone()))
    }
}

impl std::fmt::Debug for WeakComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakComponentHandle")
            .field("id", &self.id)
            .finish()
    }
}
