//! The per-controller switch between trivial (in-process) bus emulation and
//! detailed simulation by an external network simulator.
//!
//! A controller starts trivial. When service discovery observes a `Link`
//! descriptor on the controller's network, the controller flips to detailed
//! mode: outbound traffic is targeted at the simulator and inbound traffic
//! is accepted only from it. Removal of the link flips back.

use parking_lot::Mutex;

use vib_core::{ServiceDescriptor, ServiceType};
use vib_wire::DiscoveryEventKind;

/// Current simulation behavior of one bus controller.
#[derive(Debug, Clone)]
pub(crate) enum SimBehavior {
    Trivial,
    Detailed { simulator: ServiceDescriptor },
}

impl SimBehavior {
    pub fn is_trivial(&self) -> bool {
        matches!(self, SimBehavior::Trivial)
    }

    /// Whether a message from `from` may reach the controller.
    pub fn allow_reception(&self, from: &ServiceDescriptor) -> bool {
        match self {
            SimBehavior::Trivial => true,
            SimBehavior::Detailed { simulator } => {
                from.participant_name == simulator.participant_name
            }
        }
    }

    /// The target participant for outbound sends in detailed mode.
    pub fn target(&self) -> Option<&str> {
        match self {
            SimBehavior::Trivial => None,
            SimBehavior::Detailed { simulator } => Some(simulator.participant_name.as_str()),
        }
    }
}

/// Shared behavior cell plus the discovery bookkeeping for the switch.
pub(crate) struct BehaviorCell {
    network: String,
    behavior: Mutex<SimBehavior>,
}

impl BehaviorCell {
    pub fn new(network: &str) -> Self {
        Self { network: network.to_string(), behavior: Mutex::new(SimBehavior::Trivial) }
    }

    pub fn snapshot(&self) -> SimBehavior {
        self.behavior.lock().clone()
    }

    fn is_relevant(&self, service: &ServiceDescriptor) -> bool {
        service.service_type == ServiceType::Link && service.network_name == self.network
    }

    /// Feed a discovery event; flips the behavior when a matching network
    /// simulator link appears or disappears.
    pub fn on_discovery_event(&self, kind: DiscoveryEventKind, service: &ServiceDescriptor) {
        let mut behavior = self.behavior.lock();
        match (&*behavior, kind) {
            (SimBehavior::Trivial, DiscoveryEventKind::ServiceCreated)
                if self.is_relevant(service) =>
            {
                tracing::info!(network = %self.network, simulator = %service, "switching to detailed simulation");
                *behavior = SimBehavior::Detailed { simulator: service.clone() };
            }
            (SimBehavior::Detailed { .. }, DiscoveryEventKind::ServiceRemoved)
                if self.is_relevant(service) =>
            {
                tracing::info!(network = %self.network, "network simulator gone, back to trivial simulation");
                *behavior = SimBehavior::Trivial;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "sim_behavior_tests.rs"]
mod tests;
