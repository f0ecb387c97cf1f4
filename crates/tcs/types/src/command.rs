//! Commands and command sets

use crate::error::CommandError;
use crate::ids::ConfigKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Doubles(Vec<f64>),
}

impl ParamValue {
    /// Numeric view; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Double(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Double(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::Doubles(v)
    }
}

/// Named parameters, ordered by name
pub type Parameters = BTreeMap<String, ParamValue>;

/// A single structured command
///
/// Immutable once built; the `with` builder consumes and returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub config_key: ConfigKey,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Command {
    pub fn new(config_key: impl Into<ConfigKey>) -> Self {
        Self {
            config_key: config_key.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    /// Required numeric parameter
    pub fn double(&self, name: &str) -> Result<f64, CommandError> {
        self.get(name)
            .and_then(ParamValue::as_f64)
            .ok_or_else(|| CommandError::InvalidParameter {
                name: name.to_string(),
                reason: "expected a number".to_string(),
            })
    }

    /// Optional numeric parameter
    pub fn double_or(&self, name: &str, default: f64) -> Result<f64, CommandError> {
        match self.get(name) {
            None => Ok(default),
            Some(_) => self.double(name),
        }
    }

    /// Copy of this command under a different key
    pub fn rekeyed(&self, config_key: ConfigKey) -> Self {
        Self {
            config_key,
            parameters: self.parameters.clone(),
        }
    }
}

/// Commands submitted together under one client correlation label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSet {
    pub label: String,
    pub commands: Vec<Command>,
}

impl CommandSet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn single(label: impl Into<String>, command: Command) -> Self {
        Self::new(label).push(command)
    }

    pub fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
