//! Simulated devices: a deterministic map from config key to published state

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tcs_runtime::{CommandProcessor, ComponentContext, Initializable};
use tcs_types::{Command, CommandError, ConfigKey, InitializationError, ParamValue, Parameters};

/// Where a response field takes its value from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSource {
    /// Copy a parameter of the incoming command
    Param { param: String },
    Fixed(ParamValue),
}

/// How the simulator answers one config key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedResponse {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSource>,
    /// Simulated execution time
    #[serde(default)]
    pub delay_ms: u64,
    /// When set, the command fails with this reason
    #[serde(default)]
    pub fail: Option<String>,
}

impl SimulatedResponse {
    /// `{state: "idle"}`
    pub fn idle() -> Self {
        Self::default().fixed("state", "idle")
    }

    pub fn fixed(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fields.insert(name.into(), FieldSource::Fixed(value.into()));
        self
    }

    /// Publish the command's `param` under the same name
    pub fn echo(mut self, param: impl Into<String>) -> Self {
        let param = param.into();
        self.fields
            .insert(param.clone(), FieldSource::Param { param });
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail = Some(reason.into());
        self
    }

    fn render(&self, command: &Command) -> Result<Parameters, CommandError> {
        self.fields
            .iter()
            .map(|(name, source)| -> Result<(String, ParamValue), CommandError> {
                let value = match source {
                    FieldSource::Fixed(value) => value.clone(),
                    FieldSource::Param { param } => command.get(param).cloned().ok_or_else(|| {
                        CommandError::InvalidParameter {
                            name: param.clone(),
                            reason: "required parameter missing".to_string(),
                        }
                    })?,
                };
                Ok((name.clone(), value))
            })
            .collect()
    }
}

/// Responses for every key a simulated device understands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub responses: BTreeMap<ConfigKey, SimulatedResponse>,
}

impl SimulatorConfig {
    /// Answer each of `keys` with the idle state
    pub fn idle<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ConfigKey>,
    {
        let responses = keys
            .into_iter()
            .map(|key| (key.into(), SimulatedResponse::idle()))
            .collect();
        Self { responses }
    }

    pub fn respond(mut self, key: impl Into<ConfigKey>, response: SimulatedResponse) -> Self {
        self.responses.insert(key.into(), response);
        self
    }
}

/// A device stand-in driven entirely by its [`SimulatorConfig`]
pub struct SimulatedDevice {
    config: SimulatorConfig,
}

impl SimulatedDevice {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Initializable for SimulatedDevice {
    async fn initialize(&mut self, ctx: &ComponentContext) -> Result<(), InitializationError> {
        if self.config.responses.is_empty() {
            return Err(InitializationError::new(format!(
                "simulator for {} has no responses configured",
                ctx.id
            )));
        }
        tracing::debug!(keys = self.config.responses.len(), "Simulator ready");
        Ok(())
    }
}

#[async_trait]
impl CommandProcessor for SimulatedDevice {
    fn recognizes(&self, key: &ConfigKey) -> bool {
        self.config.responses.contains_key(key)
    }

    async fn execute(
        &mut self,
        _ctx: &ComponentContext,
        command: &Command,
    ) -> Result<Parameters, CommandError> {
        let response = self
            .config
            .responses
            .get(&command.config_key)
            .ok_or_else(|| CommandError::UnknownCommand(command.config_key.clone()))?;

        if response.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
        }
        if let Some(reason) = &response.fail {
            return Err(CommandError::Execution(reason.clone()));
        }
        response.render(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_response_ignores_parameters() {
        let response = SimulatedResponse::idle();
        let fields = response
            .render(&Command::new("move").with("az", 10.0).with("el", 5.0))
            .unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("state"), Some(&ParamValue::from("idle")));
    }

    #[test]
    fn test_echo_requires_parameter() {
        let response = SimulatedResponse::idle().echo("az");
        let fields = response
            .render(&Command::new("move").with("az", 10.0))
            .unwrap();
        assert_eq!(fields.get("az").and_then(ParamValue::as_f64), Some(10.0));

        let err = response.render(&Command::new("move")).unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter { name, .. } if name == "az"));
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let config: SimulatorConfig = serde_json::from_value(serde_json::json!({
            "responses": {
                "move": { "fields": { "state": "idle", "az": { "param": "az" } } },
                "park": { "fail": "brake engaged", "delay_ms": 50 }
            }
        }))
        .unwrap();

        let park = &config.responses[&ConfigKey::new("park")];
        assert_eq!(park.fail.as_deref(), Some("brake engaged"));
        assert_eq!(park.delay_ms, 50);
        let mv = &config.responses[&ConfigKey::new("move")];
        assert_eq!(
            mv.fields.get("az"),
            Some(&FieldSource::Param {
                param: "az".into()
            })
        );
        assert_eq!(
            mv.fields.get("state"),
            Some(&FieldSource::Fixed(ParamValue::from("idle")))
        );
    }

    #[test]
    fn test_idle_preset_covers_keys() {
        let config = SimulatorConfig::idle(["move", "offset"]);
        assert_eq!(config.responses.len(), 2);
        assert!(config
            .responses
            .values()
            .all(|r| *r == SimulatedResponse::idle()));
    }
}
