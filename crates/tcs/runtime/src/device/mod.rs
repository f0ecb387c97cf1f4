//! Device Controller - executes commands for one device and publishes its state

use crate::lifecycle::{Component, ComponentContext, Initializable};
use crate::runtime_core::Request;
use async_trait::async_trait;
use tcs_types::{
    Command, CommandError, ConfigKey, CurrentState, InitializationError, Parameters, TopicKey,
};
use tracing::instrument;

/// Device-specific command handling
///
/// Implementations decide which keys they understand and what state each
/// command produces; publishing and lifecycle are the controller's job.
#[async_trait]
pub trait CommandProcessor: Send {
    fn recognizes(&self, key: &ConfigKey) -> bool;

    /// Carry out `command`, returning the fields of the resulting state
    async fn execute(
        &mut self,
        ctx: &ComponentContext,
        command: &Command,
    ) -> Result<Parameters, CommandError>;
}

/// Supervised wrapper around a [`CommandProcessor`]
pub struct DeviceController<P> {
    topic: TopicKey,
    processor: P,
}

impl<P> DeviceController<P>
where
    P: CommandProcessor + Initializable + 'static,
{
    pub fn new(topic: TopicKey, processor: P) -> Self {
        Self { topic, processor }
    }

    pub fn topic(&self) -> &TopicKey {
        &self.topic
    }

    /// Execute one command and publish the resulting state
    #[instrument(skip(self, ctx, command), fields(device = %ctx.id, key = %command.config_key))]
    pub async fn process(
        &mut self,
        ctx: &ComponentContext,
        command: &Command,
    ) -> Result<CurrentState, CommandError> {
        if !self.processor.recognizes(&command.config_key) {
            tracing::debug!("Unknown command");
            return Err(CommandError::UnknownCommand(command.config_key.clone()));
        }

        let fields = self.processor.execute(ctx, command).await.map_err(|e| {
            tracing::warn!(error = %e, "Command failed");
            e
        })?;

        let state = CurrentState {
            source_key: self.topic.clone(),
            fields,
        };
        let delivered = ctx.bus.publish(&self.topic, state.clone());
        ctx.telemetry.state_published(&self.topic, delivered);
        Ok(state)
    }
}

#[async_trait]
impl<P> Initializable for DeviceController<P>
where
    P: CommandProcessor + Initializable + 'static,
{
    async fn initialize(&mut self, ctx: &ComponentContext) -> Result<(), InitializationError> {
        self.processor.initialize(ctx).await
    }

    async fn on_shutdown(&mut self, ctx: &ComponentContext) {
        self.processor.on_shutdown(ctx).await
    }
}

#[async_trait]
impl<P> Component for DeviceController<P>
where
    P: CommandProcessor + Initializable + 'static,
{
    async fn handle(&mut self, ctx: &ComponentContext, request: Request) {
        match request {
            Request::Command { command, reply } => {
                let result = self.process(ctx, &command).await;
                let _ = reply.send(result);
            }
            other => other.reject_unsupported(&ctx.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LifecycleConfig, RegistryConfig, StateBusConfig, TelemetryConfig};
    use crate::fabrics::{SnapshotStore, StateBus};
    use crate::lifecycle::Supervisor;
    use crate::runtime_core::Registry;
    use crate::telemetry::{counters, RuntimeTelemetry};
    use std::sync::Arc;
    use std::time::Duration;
    use tcs_types::{CommandSet, CommandStatus, ComponentId, LifecycleState, RejectionReason};

    /// Answers `move` by echoing the requested position
    struct Mount;

    #[async_trait]
    impl Initializable for Mount {
        async fn initialize(&mut self, _ctx: &ComponentContext) -> Result<(), InitializationError> {
            Ok(())
        }
    }

    #[async_trait]
    impl CommandProcessor for Mount {
        fn recognizes(&self, key: &ConfigKey) -> bool {
            key.as_str() == "move"
        }

        async fn execute(
            &mut self,
            _ctx: &ComponentContext,
            command: &Command,
        ) -> Result<Parameters, CommandError> {
            let az = command.double("az")?;
            let mut fields = Parameters::new();
            fields.insert("az".into(), az.into());
            Ok(fields)
        }
    }

    fn ctx() -> ComponentContext {
        ComponentContext::new(
            ComponentId::device("mcs"),
            Arc::new(Registry::new(&RegistryConfig::default())),
            Arc::new(StateBus::new(&StateBusConfig::default())),
            SnapshotStore::new(),
            Arc::new(RuntimeTelemetry::new(&TelemetryConfig::default())),
        )
    }

    async fn running(ctx: ComponentContext) -> crate::runtime_core::ComponentHandle {
        let controller = DeviceController::new(TopicKey::new("mcs"), Mount);
        let (handle, _join) = Supervisor::spawn(controller, ctx, &LifecycleConfig::default());
        handle
            .wait_for(LifecycleState::Initialized, Duration::from_secs(1))
            .await
            .unwrap();
        handle.run().await.unwrap();
        handle
    }

    #[tokio::test]
    async fn test_command_publishes_state() {
        let ctx = ctx();
        let bus = ctx.bus.clone();
        let telemetry = ctx.telemetry.clone();
        let (sub, mut mailbox) = bus.mailbox();
        bus.subscribe(&TopicKey::new("mcs"), &sub);

        let handle = running(ctx).await;
        let state = handle
            .command(Command::new("move").with("az", 10.0))
            .await
            .unwrap();
        assert_eq!(state.double("az"), Some(10.0));
        assert_eq!(state.source_key, TopicKey::new("mcs"));

        let update = mailbox.try_recv().unwrap();
        assert_eq!(update.state, state);
        assert_eq!(telemetry.counter(counters::STATES_PUBLISHED), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_publishes_nothing() {
        let ctx = ctx();
        let bus = ctx.bus.clone();
        let (sub, mut mailbox) = bus.mailbox();
        bus.subscribe(&TopicKey::new("mcs"), &sub);

        let handle = running(ctx).await;
        let err = handle.command(Command::new("park")).await.unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand(ConfigKey::new("park")));
        assert!(mailbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_missing_parameter_is_invalid() {
        let handle = running(ctx()).await;
        let err = handle.command(Command::new("move")).await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_submissions_are_not_accepted_by_devices() {
        let handle = running(ctx()).await;
        let submission = handle
            .submit(CommandSet::single("x", Command::new("move")))
            .await
            .unwrap();
        assert!(matches!(
            submission.status,
            CommandStatus::Rejected(RejectionReason::InvalidCommand(_))
        ));
    }
}
