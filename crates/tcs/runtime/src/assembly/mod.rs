//! Assembly - validates command sets, fans them out to Devices and aggregates
//!
//! Each accepted submission runs in its own task, so a slow device never
//! holds up the next submission. The client sees `Accepted` (or `Rejected`)
//! first and the terminal `Completed` report later.

mod aggregate;
mod responses;
mod routing;

pub use responses::CommandResponseManager;
pub use routing::{RoutedCommand, RoutingTable};

use crate::config::{AssemblyConfig, RuntimeConfig};
use crate::lifecycle::{Component, ComponentContext, Initializable};
use crate::runtime_core::{ComponentHandle, Request, Submission};
use aggregate::{fan_out, wait_shutdown};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tcs_types::{
    CommandSet, CommandStatus, ComponentId, InitializationError, RejectionReason, RunId,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Supervised Assembly component
pub struct Assembly {
    config: AssemblyConfig,
    routes: RoutingTable,
    responses: Arc<CommandResponseManager>,
    in_flight: JoinSet<()>,
    shutdown_tx: watch::Sender<bool>,
    resolve_timeout: Duration,
    completion_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Assembly {
    /// Build an Assembly, taking unset timeouts from the runtime defaults
    pub fn new(config: AssemblyConfig, runtime: &RuntimeConfig) -> Self {
        let resolve_timeout = config
            .resolve_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| runtime.registry.resolve_timeout());
        let completion_timeout = Duration::from_millis(
            config
                .completion_timeout_ms
                .unwrap_or(runtime.commands.completion_timeout_ms),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            routes: RoutingTable::from_config(&config),
            responses: Arc::new(CommandResponseManager::new(runtime.commands.retained_runs)),
            in_flight: JoinSet::new(),
            shutdown_tx,
            resolve_timeout,
            completion_timeout,
            shutdown_timeout: runtime.lifecycle.shutdown_timeout(),
            config,
        }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    fn submit(&mut self, ctx: &ComponentContext, set: CommandSet, reply: oneshot::Sender<Submission>) {
        self.reap();
        let run_id = RunId::generate();

        let routed = match self.routes.route(&set) {
            Ok(routed) => routed,
            Err(reason) => {
                self.responses
                    .record(run_id, CommandStatus::Rejected(reason.clone()));
                ctx.telemetry.submission_rejected(&ctx.id, run_id, &reason);
                let _ = reply.send(Submission::rejected(run_id, reason));
                return;
            }
        };

        let span = tracing::info_span!("submission", assembly = %ctx.id, %run_id, label = %set.label);
        let dispatch = Dispatch {
            ctx: ctx.clone(),
            run_id,
            label: set.label,
            routed,
            responses: self.responses.clone(),
            resolve_timeout: self.resolve_timeout,
            completion_timeout: self.completion_timeout,
            shutdown: self.shutdown_tx.subscribe(),
        };
        self.in_flight.spawn(dispatch.run(reply).instrument(span));
    }

    /// Drop finished submission tasks
    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!(error = %e, "Submission task panicked");
                }
            }
        }
    }
}

#[async_trait]
impl Initializable for Assembly {
    async fn initialize(&mut self, ctx: &ComponentContext) -> Result<(), InitializationError> {
        if self.routes.is_empty() {
            return Err(InitializationError::new(format!(
                "{} has no command routes",
                ctx.id
            )));
        }
        for target in self.routes.targets() {
            let declared = self
                .config
                .connections
                .iter()
                .any(|connection| connection.component == target);
            if !declared {
                return Err(InitializationError::new(format!(
                    "route target {} is not a declared connection",
                    target
                )));
            }
        }
        tracing::info!(
            connections = self.config.connections.len(),
            "Assembly routes verified"
        );
        Ok(())
    }

    async fn on_shutdown(&mut self, _ctx: &ComponentContext) {
        self.shutdown_tx.send_replace(true);

        let in_flight = &mut self.in_flight;
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = self.in_flight.len(),
                "In-flight submissions did not finish, aborting"
            );
            self.in_flight.abort_all();
        }
    }
}

#[async_trait]
impl Component for Assembly {
    async fn handle(&mut self, ctx: &ComponentContext, request: Request) {
        match request {
            Request::Submit { set, reply } => self.submit(ctx, set, reply),
            Request::Validate { set, reply } => {
                let status = match self.routes.route(&set) {
                    Ok(_) => CommandStatus::Accepted,
                    Err(reason) => CommandStatus::Rejected(reason),
                };
                let _ = reply.send(status);
            }
            Request::Query { run_id, reply } => {
                let _ = reply.send(self.responses.watch(&run_id));
            }
            other => other.reject_unsupported(&ctx.id),
        }
    }
}

/// One accepted-for-routing submission, from resolution to completion
struct Dispatch {
    ctx: ComponentContext,
    run_id: RunId,
    label: String,
    routed: Vec<RoutedCommand>,
    responses: Arc<CommandResponseManager>,
    resolve_timeout: Duration,
    completion_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Dispatch {
    async fn run(self, reply: oneshot::Sender<Submission>) {
        let Dispatch {
            ctx,
            run_id,
            label,
            routed,
            responses,
            resolve_timeout,
            completion_timeout,
            mut shutdown,
        } = self;

        let handles = tokio::select! {
            resolved = resolve_targets(&ctx, &routed, resolve_timeout) => resolved,
            _ = wait_shutdown(&mut shutdown) => Err(RejectionReason::NotReady),
        };

        let handles = match handles {
            Ok(handles) => handles,
            Err(reason) => {
                responses.record(run_id, CommandStatus::Rejected(reason.clone()));
                ctx.telemetry.submission_rejected(&ctx.id, run_id, &reason);
                let _ = reply.send(Submission::rejected(run_id, reason));
                return;
            }
        };

        let forwarded: Vec<_> = routed
            .into_iter()
            .map(|command| {
                let handle = handles.get(&command.target).cloned();
                (command, handle)
            })
            .collect();

        let (done_tx, done_rx) = oneshot::channel();
        responses.record(run_id, CommandStatus::Accepted);
        ctx.telemetry.submission_accepted(&ctx.id, run_id, &label);
        let _ = reply.send(Submission::accepted(run_id, done_rx));

        let deadline = tokio::time::Instant::now() + completion_timeout;
        let report = fan_out(forwarded, deadline, shutdown).await;

        ctx.telemetry.submission_completed(&ctx.id, run_id, &report);
        let status = CommandStatus::Completed(report);
        responses.record(run_id, status.clone());
        let _ = done_tx.send(status);
    }
}

/// Resolve every distinct target; the first failure rejects the submission
async fn resolve_targets(
    ctx: &ComponentContext,
    routed: &[RoutedCommand],
    timeout: Duration,
) -> Result<HashMap<ComponentId, ComponentHandle>, RejectionReason> {
    let targets: BTreeSet<ComponentId> = routed.iter().map(|r| r.target.clone()).collect();

    let lookups = targets.into_iter().map(|target| async move {
        let result = ctx.registry.resolve(&target, timeout).await;
        (target, result)
    });

    let mut handles = HashMap::new();
    for (target, result) in join_all(lookups).await {
        match result {
            Ok(handle) => {
                handles.insert(target, handle);
            }
            Err(e) => {
                tracing::warn!(device = %target, error = %e, "Dependency unavailable, nothing forwarded");
                return Err(RejectionReason::DependencyUnavailable {
                    component: target,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcs_types::{Command, ConfigKey};

    #[test]
    fn test_timeouts_fall_back_to_runtime_defaults() {
        let runtime = RuntimeConfig::default();
        let assembly = Assembly::new(AssemblyConfig::new("mcs").route("move", "mcs"), &runtime);
        assert_eq!(assembly.resolve_timeout, Duration::from_secs(5));
        assert_eq!(assembly.completion_timeout, Duration::from_secs(10));

        let assembly = Assembly::new(
            AssemblyConfig::new("mcs")
                .route("move", "mcs")
                .with_resolve_timeout(Duration::from_millis(250))
                .with_completion_timeout(Duration::from_secs(1)),
            &runtime,
        );
        assert_eq!(assembly.resolve_timeout, Duration::from_millis(250));
        assert_eq!(assembly.completion_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_validation_uses_routes() {
        let assembly = Assembly::new(
            AssemblyConfig::new("mcs").route("move", "mcs"),
            &RuntimeConfig::default(),
        );
        assert!(assembly.routes().recognizes(&ConfigKey::new("move")));
        assert!(assembly
            .routes()
            .route(&CommandSet::single("x", Command::new("follow")))
            .is_err());
    }
}
