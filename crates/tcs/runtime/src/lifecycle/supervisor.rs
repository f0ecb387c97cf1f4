//! Supervisor task: owns a component's mailbox and lifecycle state

use super::{Component, ComponentContext};
use crate::config::LifecycleConfig;
use crate::runtime_core::handle::ComponentMessage;
use crate::runtime_core::{ComponentHandle, Request};
use tcs_types::{InitializationError, LifecycleError, LifecycleState, LifecycleStatus};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Starts components under supervision
pub struct Supervisor;

impl Supervisor {
    /// Spawn `component` and begin initializing it
    ///
    /// The returned handle is the caller's; the Registry gets its own copy
    /// once initialization succeeds. When every handle is gone the component
    /// shuts itself down.
    pub fn spawn<C: Component>(
        component: C,
        ctx: ComponentContext,
        config: &LifecycleConfig,
    ) -> (ComponentHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(LifecycleStatus::default());
        let handle = ComponentHandle::new(ctx.id.clone(), tx.clone(), status_rx);

        let span = tracing::info_span!("component", id = %ctx.id);
        let task = SupervisorTask {
            component,
            ctx,
            rx,
            weak_tx: tx.downgrade(),
            status_tx,
            status_rx: handle.status_receiver(),
        };
        drop(tx);

        let join = tokio::spawn(task.run().instrument(span));
        (handle, join)
    }
}

struct SupervisorTask<C> {
    component: C,
    ctx: ComponentContext,
    rx: mpsc::Receiver<ComponentMessage>,
    /// Weak so the task alone never keeps its own mailbox open
    weak_tx: mpsc::WeakSender<ComponentMessage>,
    status_tx: watch::Sender<LifecycleStatus>,
    status_rx: watch::Receiver<LifecycleStatus>,
}

impl<C: Component> SupervisorTask<C> {
    async fn run(mut self) {
        let id = self.ctx.id.clone();

        if let Err(e) = self.transition(LifecycleState::Initializing) {
            tracing::error!(error = %e, "Supervisor started in unexpected state");
            return;
        }

        let (initialized, deferred) = self.initialize().await;
        match initialized {
            Ok(()) => {
                if self.transition(LifecycleState::Initialized).is_err() {
                    return;
                }
                if !deferred.is_empty() {
                    tracing::debug!("Shutdown requested during initialization");
                    self.shutdown().await;
                    for reply in deferred {
                        let _ = reply.send(Ok(()));
                    }
                    return;
                }
                match self.weak_tx.upgrade() {
                    Some(tx) => {
                        let handle = ComponentHandle::new(id, tx, self.status_rx.clone());
                        self.ctx.registry.announce(&handle);
                    }
                    None => {
                        // Nobody can reach us any more
                        tracing::debug!("All handles dropped during initialization");
                        self.shutdown().await;
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::error!(reason = %e.reason, "Initialization failed");
                self.fail(e.reason.clone());
                if !deferred.is_empty() {
                    for reply in deferred {
                        let _ = reply.send(Ok(()));
                    }
                    return;
                }
                self.refuse(e.reason).await;
                return;
            }
        }

        while let Some(message) = self.rx.recv().await {
            match message {
                ComponentMessage::Run { reply } => {
                    let result = self.transition(LifecycleState::Running);
                    let _ = reply.send(result);
                }
                ComponentMessage::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(Ok(()));
                    return;
                }
                ComponentMessage::Request(request) => self.admit(request).await,
            }
        }

        tracing::debug!("All handles dropped, shutting down");
        self.shutdown().await;
    }

    /// Run the init hook while answering the mailbox
    ///
    /// Requests get `NotReady` and `Run` is refused as an invalid transition.
    /// `Shutdown` replies are handed back to be answered once the hook returns.
    async fn initialize(
        &mut self,
    ) -> (
        Result<(), InitializationError>,
        Vec<oneshot::Sender<Result<(), LifecycleError>>>,
    ) {
        let mut deferred = Vec::new();
        let mut mailbox_open = true;
        let init = self.component.initialize(&self.ctx);
        tokio::pin!(init);

        let result = loop {
            tokio::select! {
                result = &mut init => break result,
                message = self.rx.recv(), if mailbox_open => match message {
                    Some(ComponentMessage::Run { reply }) => {
                        let _ = reply.send(Err(LifecycleError::InvalidTransition {
                            from: LifecycleState::Initializing,
                            to: LifecycleState::Running,
                        }));
                    }
                    Some(ComponentMessage::Shutdown { reply }) => deferred.push(reply),
                    Some(ComponentMessage::Request(request)) => {
                        tracing::debug!("Request refused, component initializing");
                        request.reject_not_ready();
                    }
                    None => mailbox_open = false,
                },
            }
        };
        (result, deferred)
    }

    async fn admit(&mut self, request: Request) {
        let state = self.state();
        let admitted = state.is_running()
            || (state == LifecycleState::Initialized && !request.requires_running());
        if admitted {
            self.component.handle(&self.ctx, request).await;
        } else {
            tracing::debug!(%state, "Request refused, component not running");
            request.reject_not_ready();
        }
    }

    /// `Initialized | Running -> ShuttingDown -> Terminated`
    async fn shutdown(&mut self) {
        if self.transition(LifecycleState::ShuttingDown).is_err() {
            return;
        }

        self.component.on_shutdown(&self.ctx).await;

        // Answer whatever is still queued, then go away
        self.rx.close();
        let mut pending_shutdowns: Vec<oneshot::Sender<Result<(), LifecycleError>>> = Vec::new();
        while let Some(message) = self.rx.recv().await {
            match message {
                ComponentMessage::Run { reply } => {
                    let _ = reply.send(Err(LifecycleError::InvalidTransition {
                        from: LifecycleState::ShuttingDown,
                        to: LifecycleState::Running,
                    }));
                }
                ComponentMessage::Shutdown { reply } => pending_shutdowns.push(reply),
                ComponentMessage::Request(request) => request.reject_not_ready(),
            }
        }

        self.ctx.registry.withdraw(&self.ctx.id);
        let _ = self.transition(LifecycleState::Terminated);
        for reply in pending_shutdowns {
            let _ = reply.send(Ok(()));
        }
    }

    /// Serve a failed component: nothing runs, everything is refused
    async fn refuse(&mut self, reason: String) {
        while let Some(message) = self.rx.recv().await {
            match message {
                ComponentMessage::Run { reply } => {
                    let _ = reply.send(Err(LifecycleError::InitializationFailed(reason.clone())));
                }
                ComponentMessage::Shutdown { reply } => {
                    // Already terminal
                    let _ = reply.send(Ok(()));
                    return;
                }
                ComponentMessage::Request(request) => request.reject_not_ready(),
            }
        }
    }

    fn state(&self) -> LifecycleState {
        self.status_tx.borrow().state
    }

    fn transition(&self, to: LifecycleState) -> Result<(), LifecycleError> {
        let from = self.state();
        if !from.can_transition_to(to) {
            tracing::warn!(%from, %to, "Invalid lifecycle transition requested");
            return Err(LifecycleError::InvalidTransition { from, to });
        }
        self.status_tx.send_replace(LifecycleStatus::new(to));
        self.ctx.telemetry.lifecycle_transition(&self.ctx.id, from, to);
        tracing::info!(%from, %to, "Lifecycle transition");
        Ok(())
    }

    fn fail(&self, reason: String) {
        let from = self.state();
        if !from.can_transition_to(LifecycleState::InitializeFailed) {
            return;
        }
        self.status_tx.send_replace(LifecycleStatus::failed(reason));
        self.ctx
            .telemetry
            .lifecycle_transition(&self.ctx.id, from, LifecycleState::InitializeFailed);
    }
}
