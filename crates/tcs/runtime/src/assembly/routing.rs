//! Config-key routing from an Assembly to its Devices

use crate::config::AssemblyConfig;
use std::collections::{BTreeSet, HashMap};
use tcs_types::{Command, CommandSet, ComponentId, ConfigKey, RejectionReason};

#[derive(Debug, Clone)]
struct Route {
    target: ComponentId,
    device_key: Option<ConfigKey>,
}

/// A command ready to forward: the device-side command and where it goes
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedCommand {
    pub index: usize,
    /// Key as the client submitted it
    pub config_key: ConfigKey,
    pub target: ComponentId,
    pub command: Command,
}

/// Maps recognized config keys to target Devices
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<ConfigKey, Route>,
}

impl RoutingTable {
    pub fn from_config(config: &AssemblyConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|r| {
                (
                    r.config_key.clone(),
                    Route {
                        target: ComponentId::device(&r.device),
                        device_key: r.device_key.clone(),
                    },
                )
            })
            .collect();
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn recognizes(&self, key: &ConfigKey) -> bool {
        self.routes.contains_key(key)
    }

    /// Every Device some route points at
    pub fn targets(&self) -> BTreeSet<ComponentId> {
        self.routes.values().map(|r| r.target.clone()).collect()
    }

    /// Route a whole set, or reject it without routing anything
    pub fn route(&self, set: &CommandSet) -> Result<Vec<RoutedCommand>, RejectionReason> {
        if set.is_empty() {
            return Err(RejectionReason::InvalidCommand(format!(
                "command set '{}' is empty",
                set.label
            )));
        }

        set.commands
            .iter()
            .enumerate()
            .map(|(index, command)| {
                let route = self.routes.get(&command.config_key).ok_or_else(|| {
                    RejectionReason::InvalidCommand(format!(
                        "unrecognized config key '{}' at position {}",
                        command.config_key, index
                    ))
                })?;
                let forwarded = match &route.device_key {
                    Some(key) => command.rekeyed(key.clone()),
                    None => command.clone(),
                };
                Ok(RoutedCommand {
                    index,
                    config_key: command.config_key.clone(),
                    target: route.target.clone(),
                    command: forwarded,
                })
            })
            .collect()
    }
}
