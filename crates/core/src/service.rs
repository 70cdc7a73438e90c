//! Service identity: every endpoint in the federation is named by a
//! [`ServiceDescriptor`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Process-local unique id assigned to a service at creation.
///
/// `(participant_name, service_id)` is globally unique because participant
/// names are unique within a federation run.
pub type ServiceId = i64;

/// What kind of endpoint a descriptor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// A bus controller or data/rpc endpoint created by a participant.
    Controller,
    /// A network simulator endpoint taking over a whole network.
    Link,
    /// A link that is itself simulated by a network simulator.
    SimulatedLink,
    /// Middleware-internal services (lifecycle, time sync, discovery).
    InternalController,
}

crate::simple_display! {
    ServiceType {
        Controller => "controller",
        Link => "link",
        SimulatedLink => "simulated-link",
        InternalController => "internal-controller",
    }
}

/// Well-known supplemental-data keys.
pub mod supplemental {
    /// Controller kind, e.g. "can", "lin", "flexray", "data-publisher".
    pub const CONTROLLER_TYPE: &str = "controllerType";
    /// Present (value "1") on the internal time-sync service of a
    /// synchronized participant.
    pub const TIME_SYNC_ACTIVE: &str = "timeSyncActive";
    /// Topic of a data publisher/subscriber.
    pub const TOPIC: &str = "topic";
    /// Media type of a data publisher/subscriber.
    pub const MEDIA_TYPE: &str = "mediaType";
    /// Function name of an rpc client/server.
    pub const FUNCTION_NAME: &str = "functionName";
}

/// Identifies an endpoint in the federation.
///
/// Invariants: `(participant_name, service_id)` is globally unique;
/// `(participant_name, service_name, network_name)` is unique within one
/// `service_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub participant_name: String,
    pub service_name: String,
    pub network_name: String,
    pub service_type: ServiceType,
    pub service_id: ServiceId,
    /// Opaque key/value pairs a service publishes about itself.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub supplemental_data: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(
        participant_name: impl Into<String>,
        service_name: impl Into<String>,
        network_name: impl Into<String>,
        service_type: ServiceType,
        service_id: ServiceId,
    ) -> Self {
        Self {
            participant_name: participant_name.into(),
            service_name: service_name.into(),
            network_name: network_name.into(),
            service_type,
            service_id,
            supplemental_data: BTreeMap::new(),
        }
    }

    pub fn with_supplemental(mut self, key: &str, value: impl Into<String>) -> Self {
        self.supplemental_data.insert(key.to_string(), value.into());
        self
    }

    pub fn supplemental(&self, key: &str) -> Option<&str> {
        self.supplemental_data.get(key).map(String::as_str)
    }

    /// Key under which peers track this descriptor.
    pub fn key(&self) -> (String, ServiceId) {
        (self.participant_name.clone(), self.service_id)
    }

    /// Two descriptors name the same endpoint.
    pub fn is_same_endpoint(&self, other: &ServiceDescriptor) -> bool {
        self.participant_name == other.participant_name && self.service_id == other.service_id
    }
}

impl std::fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{} ({}#{})",
            self.participant_name, self.service_name, self.network_name, self.service_type,
            self.service_id
        )
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
