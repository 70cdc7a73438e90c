//! Service discovery: the participant-local view of every remote service.
//!
//! Handlers registered after services already exist receive a replay of all
//! currently-known descriptors. Each handler slot tracks which descriptors
//! it has seen, so a descriptor is delivered exactly once as created and at
//! most once as removed, no matter how replay and live events interleave.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use vib_core::service::supplemental;
use vib_core::{ServiceDescriptor, ServiceId};
use vib_wire::{DiscoveryEventKind, ParticipantAnnouncement};

type Handler = Box<dyn Fn(DiscoveryEventKind, &ServiceDescriptor) + Send + Sync>;

struct Slot {
    handler: Handler,
    /// Descriptors this slot has delivered a created event for.
    seen: Mutex<HashSet<(String, ServiceId)>>,
}

impl Slot {
    /// Deliver with exactly-once semantics per descriptor.
    fn deliver(&self, kind: DiscoveryEventKind, service: &ServiceDescriptor) {
        let key = service.key();
        {
            let mut seen = self.seen.lock();
            match kind {
                DiscoveryEventKind::ServiceCreated => {
                    if !seen.insert(key) {
                        return;
                    }
                }
                DiscoveryEventKind::ServiceRemoved => {
                    if !seen.remove(&key) {
                        return;
                    }
                }
            }
        }
        (self.handler)(kind, service);
    }
}

/// The local registry of remote services.
pub struct ServiceDiscovery {
    own_name: Arc<str>,
    known: Mutex<IndexMap<(String, ServiceId), ServiceDescriptor>>,
    slots: Mutex<Vec<Arc<Slot>>>,
}

impl ServiceDiscovery {
    pub(crate) fn new(own_name: Arc<str>) -> Arc<Self> {
        Arc::new(Self {
            own_name,
            known: Mutex::new(IndexMap::new()),
            slots: Mutex::new(Vec::new()),
        })
    }

    /// Register a handler for all service discovery events. All
    /// currently-known descriptors are replayed as created events.
    pub fn add_handler(
        &self,
        handler: impl Fn(DiscoveryEventKind, &ServiceDescriptor) + Send + Sync + 'static,
    ) {
        let slot = Arc::new(Slot { handler: Box::new(handler), seen: Mutex::new(HashSet::new()) });
        self.slots.lock().push(Arc::clone(&slot));

        let replay: Vec<_> = self.known.lock().values().cloned().collect();
        for service in &replay {
            slot.deliver(DiscoveryEventKind::ServiceCreated, service);
        }
    }

    /// Register a handler filtered by controller type and one supplemental
    /// key/value pair. Replay applies the same filter.
    pub fn add_specific_handler(
        &self,
        controller_type: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        handler: impl Fn(DiscoveryEventKind, &ServiceDescriptor) + Send + Sync + 'static,
    ) {
        let controller_type = controller_type.into();
        let key = key.into();
        let value = value.into();
        self.add_handler(move |kind, service| {
            if service.supplemental(supplemental::CONTROLLER_TYPE) == Some(controller_type.as_str())
                && service.supplemental(&key) == Some(value.as_str())
            {
                handler(kind, service);
            }
        });
    }

    /// Snapshot of every known remote descriptor.
    pub fn known_services(&self) -> Vec<ServiceDescriptor> {
        self.known.lock().values().cloned().collect()
    }

    /// Ingest a participant announcement (from the welcome replay or a live
    /// broadcast). Only descriptors not seen before fire events.
    pub(crate) fn on_announcement(&self, announcement: &ParticipantAnnouncement) {
        if announcement.participant_name == self.own_name.as_ref() {
            return;
        }
        for service in &announcement.services {
            self.on_event(DiscoveryEventKind::ServiceCreated, service);
        }
    }

    /// Ingest a single discovery event.
    pub(crate) fn on_event(&self, kind: DiscoveryEventKind, service: &ServiceDescriptor) {
        if service.participant_name == self.own_name.as_ref() {
            return;
        }
        let fresh = {
            let mut known = self.known.lock();
            match kind {
                DiscoveryEventKind::ServiceCreated => {
                    known.insert(service.key(), service.clone()).is_none()
                }
                DiscoveryEventKind::ServiceRemoved => known.shift_remove(&service.key()).is_some(),
            }
        };
        if !fresh {
            return;
        }
        debug!(%service, ?kind, "service discovery event");
        let slots: Vec<_> = self.slots.lock().clone();
        for slot in slots {
            slot.deliver(kind, service);
        }
    }

    /// A peer is gone: synthesize removal events for everything it owned.
    pub(crate) fn on_peer_gone(&self, participant_name: &str) {
        let owned: Vec<_> = self
            .known
            .lock()
            .values()
            .filter(|s| s.participant_name == participant_name)
            .cloned()
            .collect();
        for service in owned {
            self.on_event(DiscoveryEventKind::ServiceRemoved, &service);
        }
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
