//! Concurrent fan-out of routed commands and aggregation of their outcomes

use super::routing::RoutedCommand;
use crate::runtime_core::ComponentHandle;
use futures::future::join_all;
use tcs_types::{CommandError, CommandOutcome, CompletionReport, OutcomeResult};
use tokio::sync::watch;
use tokio::time::Instant;

/// Forward every command to its resolved device and wait for all of them
///
/// Each command is bounded by the shared `deadline`. A shutdown signal turns
/// every command still waiting into `Abandoned`. A command without a handle
/// fails with `ComponentUnavailable`. The report lists one outcome per
/// command, in submission order.
pub(crate) async fn fan_out(
    routed: Vec<(RoutedCommand, Option<ComponentHandle>)>,
    deadline: Instant,
    shutdown: watch::Receiver<bool>,
) -> CompletionReport {
    let pending = routed.into_iter().map(|(routed, handle)| {
        let mut shutdown = shutdown.clone();
        async move {
            let RoutedCommand {
                index,
                config_key,
                target,
                command,
            } = routed;

            let Some(handle) = handle else {
                tracing::error!(index, %config_key, device = %target, "No handle for sub-command");
                return CommandOutcome {
                    index,
                    config_key,
                    target: Some(target.clone()),
                    result: OutcomeResult::Failed(CommandError::ComponentUnavailable(target)),
                };
            };

            let result = tokio::select! {
                answer = tokio::time::timeout_at(deadline, handle.command(command)) => match answer {
                    Ok(Ok(state)) => OutcomeResult::Completed(state),
                    Ok(Err(e)) => OutcomeResult::Failed(e),
                    Err(_) => OutcomeResult::TimedOut,
                },
                _ = wait_shutdown(&mut shutdown) => OutcomeResult::Abandoned,
            };

            if !matches!(result, OutcomeResult::Completed(_)) {
                tracing::debug!(index, %config_key, device = %target, ?result, "Sub-command did not complete");
            }
            CommandOutcome {
                index,
                config_key,
                target: Some(target),
                result,
            }
        }
    });

    CompletionReport::from_outcomes(join_all(pending).await)
}

/// Resolves once shutdown is signalled; never if the signal is gone
pub(crate) async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
