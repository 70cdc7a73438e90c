//! The participant configuration document (YAML or JSON).
//!
//! Only the keys below are recognized; anything else is collected into
//! `extra` and reported by [`ParticipantConfig::unknown_keys`] so the caller
//! can warn without rejecting the document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors, surfaced synchronously to the caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Misconfiguration(String),

    #[error("duplicate controller name {0:?}")]
    DuplicateController(String),

    #[error("no participant name in configuration or arguments")]
    MissingParticipantName,
}

/// A bus controller entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControllerConfig {
    pub name: String,
    /// Overrides the programmatic network when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// A data publisher or subscriber entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataEndpointConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<u32>,
}

/// Where a log sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSinkType {
    File,
    Remote,
    Stdout,
}

/// Severity threshold of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

/// One configured log sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogSinkConfig {
    #[serde(rename = "Type")]
    pub sink_type: LogSinkType,
    pub level: LogLevel,
    /// Log file path for `File` sinks; defaults to `<participant>.log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,
}

/// The `Logging` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub sinks: Vec<LogSinkConfig>,
}

/// The `HealthCheck` section: watchdog limits for the simulation task, in
/// milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheckConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_response_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_response_timeout: Option<u64>,
}

impl HealthCheckConfig {
    pub fn soft_timeout(&self) -> Option<Duration> {
        self.soft_response_timeout.map(Duration::from_millis)
    }

    pub fn hard_timeout(&self) -> Option<Duration> {
        self.hard_response_timeout.map(Duration::from_millis)
    }
}

/// The complete participant configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParticipantConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub can_controllers: Vec<ControllerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lin_controllers: Vec<ControllerConfig>,
    #[serde(default, rename = "FlexRayControllers", skip_serializing_if = "Vec::is_empty")]
    pub flexray_controllers: Vec<ControllerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ethernet_controllers: Vec<ControllerConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_publishers: Vec<DataEndpointConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_subscribers: Vec<DataEndpointConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Unrecognized top-level keys; ignored with a warning.
    #[serde(default, flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ParticipantConfig {
    /// Parse a YAML (or JSON — YAML is a superset) document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: ParticipantConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Top-level keys the schema does not recognize.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for list in [
            &self.can_controllers,
            &self.lin_controllers,
            &self.flexray_controllers,
            &self.ethernet_controllers,
        ] {
            let mut seen = std::collections::BTreeSet::new();
            for ctrl in list.iter() {
                if !seen.insert(ctrl.name.as_str()) {
                    return Err(ConfigError::DuplicateController(ctrl.name.clone()));
                }
            }
        }
        Ok(())
    }

    fn controller_entry<'a>(
        list: &'a [ControllerConfig],
        name: &str,
    ) -> Option<&'a ControllerConfig> {
        list.iter().find(|c| c.name == name)
    }

    /// Resolve the network a controller lives on: the configured network
    /// wins over the programmatic one, which defaults to the controller
    /// name.
    pub fn resolve_network(
        list: &[ControllerConfig],
        name: &str,
        programmatic: Option<&str>,
    ) -> String {
        if let Some(entry) = Self::controller_entry(list, name) {
            if let Some(network) = &entry.network {
                return network.clone();
            }
        }
        programmatic.unwrap_or(name).to_string()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
