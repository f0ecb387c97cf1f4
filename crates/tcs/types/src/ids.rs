//! Identity types for the TCS coordination core

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of a running component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Lower-level controller that owns a piece of hardware (or its simulator)
    Device,
    /// Aggregating component that routes commands to its devices
    Assembly,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Device => write!(f, "device"),
            ComponentKind::Assembly => write!(f, "assembly"),
        }
    }
}

/// Identifier of a running component instance
///
/// Used as the Registry key and as the target of a [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    pub name: String,
    pub kind: ComponentKind,
}

impl ComponentId {
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn device(name: impl Into<String>) -> Self {
        Self::new(name, ComponentKind::Device)
    }

    pub fn assembly(name: impl Into<String>) -> Self {
        Self::new(name, ComponentKind::Assembly)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.kind)
    }
}

/// Transport needed to reach a dependency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Actor reference living in the same process
    #[default]
    InProcess,
}

/// A dependency declared by an Assembly at construction time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub component: ComponentId,
    #[serde(default)]
    pub kind: ConnectionKind,
}

impl Connection {
    pub fn in_process(component: ComponentId) -> Self {
        Self {
            component,
            kind: ConnectionKind::InProcess,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component)
    }
}

/// Key selecting what a command does (e.g. `move`, `offset`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigKey(String);

impl ConfigKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConfigKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ConfigKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State Bus topic identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TopicKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by an Assembly to one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run:{}", self.0)
    }
}
