//! Outbound plumbing shared by every service of one participant.
//!
//! A [`BusHandle`] is the only thing a controller needs for sending: it
//! carries the writer queue, the dispatcher queue for local loopback, and
//! the time provider for stamping. Controllers hold a handle instead of a
//! back-reference to the participant, so there is no ownership cycle.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use vib_core::ServiceDescriptor;
use vib_wire::{Envelope, Message, WireFrame};

use crate::timesync::TimeProvider;

/// Items the participant's dispatcher processes, strictly one at a time.
#[derive(Debug)]
pub(crate) enum DispatchItem {
    /// An inbound or locally looped-back message.
    Deliver(Envelope),
    /// Kick off the lifecycle state machine.
    StartLifecycle,
    /// Deferred re-evaluation of the time-quantum grant.
    TimeGrantCheck,
    /// A remote participant's connection went away.
    PeerGone(String),
    /// The registry connection itself is gone.
    Disconnected,
}

/// Items of the writer task's queue.
#[derive(Debug)]
pub(crate) enum WriterItem {
    Frame(WireFrame),
    /// Acknowledged once every frame queued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// Cheap-to-clone outbound handle of one participant.
#[derive(Clone)]
pub(crate) struct BusHandle {
    pub participant_name: Arc<str>,
    wire_tx: mpsc::UnboundedSender<WriterItem>,
    queue_tx: mpsc::UnboundedSender<DispatchItem>,
    pub time_provider: Arc<TimeProvider>,
    next_service_id: Arc<AtomicI64>,
}

impl BusHandle {
    pub fn new(
        participant_name: &str,
        wire_tx: mpsc::UnboundedSender<WriterItem>,
        queue_tx: mpsc::UnboundedSender<DispatchItem>,
        time_provider: Arc<TimeProvider>,
    ) -> Self {
        Self {
            participant_name: participant_name.into(),
            wire_tx,
            queue_tx,
            time_provider,
            next_service_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Draw the next process-local service id.
    pub fn next_service_id(&self) -> i64 {
        self.next_service_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Virtual (or wall-clock, when unsynchronized) now in nanoseconds.
    pub fn now(&self) -> i64 {
        self.time_provider.now()
    }

    /// Broadcast to the federation and loop back to the local participant.
    pub fn send(&self, sender: &ServiceDescriptor, msg: Message) {
        self.send_envelope(Envelope::broadcast(sender.clone(), msg));
    }

    /// Targeted send: only `to` dispatches it (the local loopback applies
    /// the same filter).
    pub fn send_to(&self, sender: &ServiceDescriptor, to: &str, msg: Message) {
        self.send_envelope(Envelope::targeted(sender.clone(), to, msg));
    }

    fn send_envelope(&self, envelope: Envelope) {
        // Writer task first, then the local loopback; both queues preserve
        // per-sender order. Log records are not looped back: re-emitting
        // them locally would feed the remote log sink its own output.
        let loopback = !matches!(envelope.msg, Message::LogMsg(..));
        let _ = self.wire_tx.send(WriterItem::Frame(WireFrame::Msg(envelope.clone())));
        if loopback {
            let _ = self.queue_tx.send(DispatchItem::Deliver(envelope));
        }
    }

    /// Enqueue a dispatcher item (deferred grant checks and the like).
    pub fn enqueue(&self, item: DispatchItem) {
        let _ = self.queue_tx.send(item);
    }

    /// Ask the writer to acknowledge once everything queued so far is on
    /// the wire.
    pub fn flush(&self) -> Option<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.wire_tx.send(WriterItem::Flush(tx)).ok()?;
        Some(rx)
    }
}
