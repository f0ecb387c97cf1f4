//! Telemetry and observability for the TCS runtime

use crate::config::{LoggingConfig, TelemetryConfig};
use dashmap::DashMap;
use tcs_types::{ComponentId, CompletionReport, LifecycleState, RejectionReason, RunId, TopicKey};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `config.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    }
}

pub mod counters {
    pub const SUBMISSIONS_ACCEPTED: &str = "submissions_accepted";
    pub const SUBMISSIONS_REJECTED: &str = "submissions_rejected";
    pub const SUBMISSIONS_ALL_COMPLETED: &str = "submissions_all_completed";
    pub const SUBMISSIONS_INCOMPLETE: &str = "submissions_incomplete";
    pub const STATES_PUBLISHED: &str = "states_published";
    pub const LIFECYCLE_TRANSITIONS: &str = "lifecycle_transitions";
    pub const INITIALIZATION_FAILURES: &str = "initialization_failures";
}

/// Per-runtime counters, logged on flush
///
/// Safe to share across tasks; every counter is an independent map entry.
pub struct RuntimeTelemetry {
    config: TelemetryConfig,
    counters: DashMap<&'static str, u64>,
}

impl RuntimeTelemetry {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            config: config.clone(),
            counters: DashMap::new(),
        }
    }

    pub fn submission_accepted(&self, assembly: &ComponentId, run_id: RunId, label: &str) {
        if !self.config.metrics_enabled {
            return;
        }

        tracing::debug!(%assembly, %run_id, label, "Submission accepted");
        self.increment(counters::SUBMISSIONS_ACCEPTED);
    }

    pub fn submission_rejected(&self, assembly: &ComponentId, run_id: RunId, reason: &RejectionReason) {
        if !self.config.metrics_enabled {
            return;
        }

        tracing::info!(%assembly, %run_id, %reason, "Submission rejected");
        self.increment(counters::SUBMISSIONS_REJECTED);
    }

    pub fn submission_completed(&self, assembly: &ComponentId, run_id: RunId, report: &CompletionReport) {
        if !self.config.metrics_enabled {
            return;
        }

        if report.is_all_completed() {
            tracing::debug!(%assembly, %run_id, commands = report.per_command.len(), "Submission completed");
            self.increment(counters::SUBMISSIONS_ALL_COMPLETED);
        } else {
            tracing::warn!(
                %assembly,
                %run_id,
                failed = report.failures().count(),
                commands = report.per_command.len(),
                "Submission incomplete"
            );
            self.increment(counters::SUBMISSIONS_INCOMPLETE);
        }
    }

    pub fn state_published(&self, topic: &TopicKey, delivered: usize) {
        if !self.config.metrics_enabled {
            return;
        }

        tracing::trace!(%topic, delivered, "State published");
        self.increment(counters::STATES_PUBLISHED);
    }

    pub fn lifecycle_transition(&self, component: &ComponentId, from: LifecycleState, to: LifecycleState) {
        if !self.config.metrics_enabled {
            return;
        }

        tracing::debug!(%component, %from, %to, "Lifecycle transition");
        self.increment(counters::LIFECYCLE_TRANSITIONS);
        if to == LifecycleState::InitializeFailed {
            self.increment(counters::INITIALIZATION_FAILURES);
        }
    }

    /// Current value of a counter
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    /// Log every counter
    pub async fn flush(&self) {
        if !self.config.enabled {
            return;
        }

        for entry in self.counters.iter() {
            tracing::info!(counter = *entry.key(), value = *entry.value(), "Telemetry counter");
        }
    }

    fn increment(&self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcs_types::{CommandOutcome, ConfigKey, OutcomeResult};

    #[test]
    fn test_counters_increment() {
        let telemetry = RuntimeTelemetry::new(&TelemetryConfig::default());
        let id = ComponentId::assembly("mcs");
        telemetry.submission_accepted(&id, RunId::generate(), "a");
        telemetry.submission_accepted(&id, RunId::generate(), "b");
        telemetry.submission_rejected(&id, RunId::generate(), &RejectionReason::NotReady);
        assert_eq!(telemetry.counter(counters::SUBMISSIONS_ACCEPTED), 2);
        assert_eq!(telemetry.counter(counters::SUBMISSIONS_REJECTED), 1);
    }

    #[test]
    fn test_incomplete_reports_counted_separately() {
        let telemetry = RuntimeTelemetry::new(&TelemetryConfig::default());
        let report = CompletionReport::from_outcomes(vec![CommandOutcome {
            index: 0,
            config_key: ConfigKey::new("move"),
            target: None,
            result: OutcomeResult::TimedOut,
        }]);
        telemetry.submission_completed(&ComponentId::assembly("mcs"), RunId::generate(), &report);
        assert_eq!(telemetry.counter(counters::SUBMISSIONS_INCOMPLETE), 1);
        assert_eq!(telemetry.counter(counters::SUBMISSIONS_ALL_COMPLETED), 0);
    }

    #[test]
    fn test_disabled_metrics_record_nothing() {
        let telemetry = RuntimeTelemetry::new(&TelemetryConfig {
            enabled: true,
            metrics_enabled: false,
        });
        telemetry.state_published(&TopicKey::new("mcs"), 0);
        assert_eq!(telemetry.counter(counters::STATES_PUBLISHED), 0);
    }

    #[test]
    fn test_failed_initialization_counted() {
        let telemetry = RuntimeTelemetry::new(&TelemetryConfig::default());
        telemetry.lifecycle_transition(
            &ComponentId::device("mcs"),
            LifecycleState::Initializing,
            LifecycleState::InitializeFailed,
        );
        assert_eq!(telemetry.counter(counters::INITIALIZATION_FAILURES), 1);
        assert_eq!(telemetry.counter(counters::LIFECYCLE_TRANSITIONS), 1);
    }
}
