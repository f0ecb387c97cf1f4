//! Configuration for the TCS coordination runtime

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tcs_types::{ComponentId, ConfigKey, Connection, TopicKey};
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub state_bus: StateBusConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub assemblies: Vec<AssemblyConfig>,
}

impl RuntimeConfig {
    /// Load configuration: defaults, then an optional file, then `TCS_*` environment variables
    ///
    /// Nested keys use a double underscore, e.g. `TCS_REGISTRY__RESOLVE_TIMEOUT_MS=2000`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&RuntimeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TCS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references between devices and assemblies
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for device in &self.devices {
            if !names.insert(ComponentId::device(&device.name)) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
        }
        for assembly in &self.assemblies {
            if !names.insert(ComponentId::assembly(&assembly.name)) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate assembly name: {}",
                    assembly.name
                )));
            }
            assembly.validate()?;
        }
        if self.lifecycle.mailbox_capacity == 0 || self.state_bus.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mailbox capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Default deadline for `resolve`
    pub resolve_timeout_ms: u64,
    /// Capacity of the announce/withdraw event stream
    pub event_capacity: usize,
}

impl RegistryConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: 5000,
            event_capacity: 256,
        }
    }
}

/// State Bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateBusConfig {
    /// Per-subscriber mailbox depth; deliveries beyond it are dropped
    pub mailbox_capacity: usize,
}

impl Default for StateBusConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
        }
    }
}

/// Lifecycle supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Depth of each component's inbound mailbox
    pub mailbox_capacity: usize,
    /// How long `run_all` waits for a component to finish initializing
    pub init_timeout_ms: u64,
    /// How long a shutting-down component waits for in-flight work
    pub shutdown_timeout_ms: u64,
}

impl LifecycleConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            init_timeout_ms: 5000,
            shutdown_timeout_ms: 5000,
        }
    }
}

/// Command handling defaults shared by all assemblies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Aggregate deadline for one submission's fan-out
    pub completion_timeout_ms: u64,
    /// Terminal statuses kept for `query` before the oldest are forgotten
    pub retained_runs: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            completion_timeout_ms: 10_000,
            retained_runs: 1024,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_enabled: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// JSON formatted output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A Device Controller instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    /// State Bus topic the device publishes on; defaults to its name
    #[serde(default)]
    pub topic: Option<TopicKey>,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<TopicKey>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn id(&self) -> ComponentId {
        ComponentId::device(&self.name)
    }

    pub fn topic(&self) -> TopicKey {
        self.topic
            .clone()
            .unwrap_or_else(|| TopicKey::new(self.name.clone()))
    }
}

/// An Assembly instance: the devices it depends on and how keys route to them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    pub name: String,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    /// Overrides `registry.resolve_timeout_ms`
    #[serde(default)]
    pub resolve_timeout_ms: Option<u64>,
    /// Overrides `commands.completion_timeout_ms`
    #[serde(default)]
    pub completion_timeout_ms: Option<u64>,
}

impl AssemblyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connections: Vec::new(),
            routes: Vec::new(),
            resolve_timeout_ms: None,
            completion_timeout_ms: None,
        }
    }

    /// Declare a device dependency and route `config_key` to it unchanged
    pub fn route(self, config_key: impl Into<ConfigKey>, device: impl Into<String>) -> Self {
        self.route_as(config_key, device, None)
    }

    /// Route `config_key` to `device`, optionally renaming the key on the way
    pub fn route_as(
        mut self,
        config_key: impl Into<ConfigKey>,
        device: impl Into<String>,
        device_key: Option<ConfigKey>,
    ) -> Self {
        let device = device.into();
        let connection = Connection::in_process(ComponentId::device(&device));
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
        self.routes.push(RouteConfig {
            config_key: config_key.into(),
            device,
            device_key,
        });
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn id(&self) -> ComponentId {
        ComponentId::assembly(&self.name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut keys = HashSet::new();
        for route in &self.routes {
            if !keys.insert(&route.config_key) {
                return Err(ConfigError::Invalid(format!(
                    "assembly {}: duplicate route for {}",
                    self.name, route.config_key
                )));
            }
        }
        Ok(())
    }
}

/// One recognized config key and the device it is forwarded to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub config_key: ConfigKey,
    pub device: String,
    /// Key used on the device side; defaults to `config_key`
    #[serde(default)]
    pub device_key: Option<ConfigKey>,
}
