//! Topic-based publish/subscribe endpoints.
//!
//! Publishers and subscribers match on topic (carried as the network name
//! of their descriptors), media type (empty matches anything) and labels:
//! every label of the subscriber must be present with the same value on the
//! publisher.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use vib_core::service::supplemental;
use vib_core::{HandlerId, HandlerIdSource, HandlerRegistry, ServiceDescriptor};
use vib_wire::Message;

use crate::bus::BusHandle;

/// Label prefix inside the descriptor's supplemental data.
const LABEL_PREFIX: &str = "label:";

/// Topic, media type and labels of a publisher or subscriber.
#[derive(Debug, Clone, Default)]
pub struct PubSubSpec {
    pub topic: String,
    pub media_type: String,
    pub labels: BTreeMap<String, String>,
}

impl PubSubSpec {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into(), ..Default::default() }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A received data message.
#[derive(Debug, Clone)]
pub struct DataMessageEvent {
    pub timestamp: i64,
    pub data: Vec<u8>,
}

pub(crate) fn labels_to_supplemental(
    descriptor: ServiceDescriptor,
    labels: &BTreeMap<String, String>,
) -> ServiceDescriptor {
    let mut descriptor = descriptor;
    for (key, value) in labels {
        descriptor = descriptor.with_supplemental(&format!("{LABEL_PREFIX}{key}"), value.clone());
    }
    descriptor
}

fn labels_from_descriptor(descriptor: &ServiceDescriptor) -> BTreeMap<String, String> {
    descriptor
        .supplemental_data
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(LABEL_PREFIX).map(|k| (k.to_string(), v.clone())))
        .collect()
}

pub(crate) struct PublisherCore {
    pub descriptor: ServiceDescriptor,
    bus: BusHandle,
}

impl PublisherCore {
    pub fn new(bus: BusHandle, descriptor: ServiceDescriptor) -> Arc<Self> {
        Arc::new(Self { descriptor, bus })
    }
}

/// Publishes byte payloads on a topic.
#[derive(Clone)]
pub struct DataPublisher {
    core: Arc<PublisherCore>,
}

impl DataPublisher {
    pub(crate) fn new(core: Arc<PublisherCore>) -> Self {
        Self { core }
    }

    pub fn topic(&self) -> &str {
        &self.core.descriptor.network_name
    }

    /// Publish one message, stamped with the current simulation time.
    pub fn publish(&self, data: impl Into<Vec<u8>>) {
        let msg = Message::DataMessageEvent { timestamp: self.core.bus.now(), data: data.into() };
        self.core.bus.send(&self.core.descriptor, msg);
    }
}

pub(crate) struct SubscriberCore {
    pub descriptor: ServiceDescriptor,
    media_type: String,
    labels: BTreeMap<String, String>,
    handlers: HandlerRegistry<DataMessageEvent>,
}

impl SubscriberCore {
    pub fn new(
        descriptor: ServiceDescriptor,
        media_type: String,
        labels: BTreeMap<String, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            media_type,
            labels,
            handlers: HandlerRegistry::new(HandlerIdSource::new()),
        })
    }

    pub fn topic(&self) -> &str {
        &self.descriptor.network_name
    }

    /// Publisher/subscriber matching beyond the topic.
    fn accepts(&self, publisher: &ServiceDescriptor) -> bool {
        if !self.media_type.is_empty() {
            let published = publisher.supplemental(supplemental::MEDIA_TYPE).unwrap_or("");
            if !published.is_empty() && published != self.media_type {
                return false;
            }
        }
        let published_labels = labels_from_descriptor(publisher);
        self.labels.iter().all(|(k, v)| published_labels.get(k) == Some(v))
    }

    pub fn on_data(&self, sender: &ServiceDescriptor, timestamp: i64, data: &[u8]) {
        if !self.accepts(sender) {
            return;
        }
        self.handlers.dispatch(&DataMessageEvent { timestamp, data: data.to_vec() });
    }
}

/// Receives byte payloads published on a topic.
#[derive(Clone)]
pub struct DataSubscriber {
    core: Arc<SubscriberCore>,
}

impl DataSubscriber {
    pub(crate) fn new(core: Arc<SubscriberCore>) -> Self {
        Self { core }
    }

    pub fn topic(&self) -> &str {
        self.core.topic()
    }

    pub fn add_data_message_handler(
        &self,
        handler: impl Fn(&DataMessageEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.handlers.add(handler)
    }

    pub fn remove_data_message_handler(&self, id: HandlerId) {
        if !self.core.handlers.remove(id) {
            warn!(%id, "remove_data_message_handler: unknown handler id");
        }
    }
}

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;
