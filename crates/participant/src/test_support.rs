//! Helpers for unit tests: a bus handle whose queues are inspectable
//! instead of wired to a connection.

use tokio::sync::mpsc;

use vib_core::{ServiceDescriptor, ServiceType};
use vib_wire::{Envelope, WireFrame};

use crate::bus::{BusHandle, DispatchItem, WriterItem};
use crate::timesync::TimeProvider;

pub(crate) struct TestWires {
    pub wire_rx: mpsc::UnboundedReceiver<WriterItem>,
    pub queue_rx: mpsc::UnboundedReceiver<DispatchItem>,
}

impl TestWires {
    /// Drain everything queued for the wire so far.
    pub fn sent(&mut self) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(item) = self.wire_rx.try_recv() {
            if let WriterItem::Frame(WireFrame::Msg(envelope)) = item {
                envelopes.push(envelope);
            }
        }
        envelopes
    }
}

pub(crate) fn test_bus(participant_name: &str) -> (BusHandle, TestWires) {
    let (wire_tx, wire_rx) = mpsc::unbounded_channel();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let bus = BusHandle::new(participant_name, wire_tx, queue_tx, TimeProvider::new());
    (bus, TestWires { wire_rx, queue_rx })
}

pub(crate) fn controller_descriptor(
    participant: &str,
    service: &str,
    network: &str,
    service_id: i64,
) -> ServiceDescriptor {
    ServiceDescriptor::new(participant, service, network, ServiceType::Controller, service_id)
}
