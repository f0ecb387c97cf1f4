//! Published device state

use crate::command::{ParamValue, Parameters};
use crate::ids::TopicKey;
use serde::{Deserialize, Serialize};

/// State published by a Device Controller after processing a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub source_key: TopicKey,
    #[serde(default)]
    pub fields: Parameters,
}

impl CurrentState {
    pub fn new(source_key: impl Into<TopicKey>) -> Self {
        Self {
            source_key: source_key.into(),
            fields: Parameters::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.fields.get(name)
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }
}

/// A state delivered to a subscriber, tagged with the topic it arrived on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub topic: TopicKey,
    pub state: CurrentState,
}
