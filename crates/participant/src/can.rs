//! CAN controller, trivial simulation.
//!
//! Sending stamps the frame with the current simulation time and a
//! per-controller transmit id. The receiving side acknowledges every frame
//! with a transmit event targeted back at the sending participant.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vib_core::can::CanBaudRate;
use vib_core::{
    CanControllerMode, CanFrame, CanTransmitStatus, HandlerId, HandlerIdSource, HandlerRegistry,
    ServiceDescriptor, StateError,
};
use vib_wire::Message;

use crate::bus::BusHandle;
use crate::sim_behavior::BehaviorCell;

/// A received CAN frame with its send timestamp.
#[derive(Debug, Clone)]
pub struct CanFrameEvent {
    pub timestamp: i64,
    pub frame: CanFrame,
}

/// Acknowledgement for a frame this controller sent.
#[derive(Debug, Clone)]
pub struct CanFrameTransmitEvent {
    pub timestamp: i64,
    pub transmit_id: u32,
    pub status: CanTransmitStatus,
}

pub(crate) struct CanCore {
    pub descriptor: ServiceDescriptor,
    bus: BusHandle,
    pub behavior: BehaviorCell,
    mode: Mutex<CanControllerMode>,
    baud: Mutex<CanBaudRate>,
    next_transmit_id: AtomicU32,
    frame_handlers: HandlerRegistry<CanFrameEvent>,
    transmit_handlers: HandlerRegistry<CanFrameTransmitEvent>,
}

impl CanCore {
    pub fn new(bus: BusHandle, descriptor: ServiceDescriptor) -> Arc<Self> {
        let ids = HandlerIdSource::new();
        Arc::new(Self {
            behavior: BehaviorCell::new(&descriptor.network_name),
            descriptor,
            bus,
            mode: Mutex::new(CanControllerMode::Uninit),
            baud: Mutex::new(CanBaudRate::default()),
            next_transmit_id: AtomicU32::new(0),
            frame_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            transmit_handlers: HandlerRegistry::new(ids),
        })
    }

    pub fn network(&self) -> &str {
        &self.descriptor.network_name
    }

    fn set_mode(&self, mode: CanControllerMode) {
        *self.mode.lock() = mode;
        match self.behavior.snapshot().target() {
            Some(simulator) => {
                self.bus.send_to(&self.descriptor, simulator, Message::CanSetControllerMode { mode });
            }
            None => {
                self.bus.send(&self.descriptor, Message::CanControllerStatus { mode });
            }
        }
    }

    pub fn send_frame(&self, frame: CanFrame) -> Result<u32, StateError> {
        frame.validate()?;
        let mode = *self.mode.lock();
        if mode != CanControllerMode::Started {
            return Err(StateError::new(format!(
                "send_frame requires a started controller (mode is {mode})"
            )));
        }
        let transmit_id = self.next_transmit_id.fetch_add(1, Ordering::Relaxed) + 1;
        let msg =
            Message::CanFrameEvent { timestamp: self.bus.now(), transmit_id, frame };
        match self.behavior.snapshot().target() {
            Some(simulator) => self.bus.send_to(&self.descriptor, simulator, msg),
            None => self.bus.send(&self.descriptor, msg),
        }
        Ok(transmit_id)
    }

    // -- inbound, dispatcher only --

    pub fn on_frame_event(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        transmit_id: u32,
        frame: &CanFrame,
    ) {
        let behavior = self.behavior.snapshot();
        if !behavior.allow_reception(sender) {
            return;
        }
        self.frame_handlers.dispatch(&CanFrameEvent { timestamp, frame: frame.clone() });

        // Trivial simulation: the receiver acknowledges to the sender.
        if behavior.is_trivial() {
            self.bus.send_to(
                &self.descriptor,
                &sender.participant_name,
                Message::CanFrameTransmitEvent {
                    timestamp,
                    transmit_id,
                    status: CanTransmitStatus::Transmitted,
                },
            );
        }
    }

    pub fn on_frame_transmit_event(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        transmit_id: u32,
        status: CanTransmitStatus,
    ) {
        if !self.behavior.snapshot().allow_reception(sender) {
            return;
        }
        self.transmit_handlers.dispatch(&CanFrameTransmitEvent { timestamp, transmit_id, status });
    }

    pub fn on_controller_status(&self, sender: &ServiceDescriptor, mode: CanControllerMode) {
        debug!(sender = %sender, %mode, "peer can controller status");
    }
}

/// User handle of a CAN controller. Cloneable; all methods are callable
/// from any thread.
#[derive(Clone)]
pub struct CanController {
    core: Arc<CanCore>,
}

impl CanController {
    pub(crate) fn new(core: Arc<CanCore>) -> Self {
        Self { core }
    }

    /// Configure the nominal (and FD data-phase) baud rate.
    pub fn set_baud_rate(&self, rate: u32, fd_rate: u32) {
        let baud = CanBaudRate { rate, fd_rate };
        *self.core.baud.lock() = baud;
        match self.core.behavior.snapshot().target() {
            Some(simulator) => self.core.bus.send_to(
                &self.core.descriptor,
                simulator,
                Message::CanConfigureBaudrate(baud),
            ),
            None => self.core.bus.send(&self.core.descriptor, Message::CanConfigureBaudrate(baud)),
        }
    }

    /// Start the controller; frames can only be sent while started.
    pub fn start(&self) {
        self.core.set_mode(CanControllerMode::Started);
    }

    pub fn stop(&self) {
        self.core.set_mode(CanControllerMode::Stopped);
    }

    pub fn sleep(&self) {
        self.core.set_mode(CanControllerMode::Sleep);
    }

    pub fn mode(&self) -> CanControllerMode {
        *self.core.mode.lock()
    }

    /// Send a frame; returns the transmit id echoed in the acknowledgement.
    pub fn send_frame(&self, frame: CanFrame) -> Result<u32, StateError> {
        self.core.send_frame(frame)
    }

    pub fn add_frame_handler(
        &self,
        handler: impl Fn(&CanFrameEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.frame_handlers.add(handler)
    }

    pub fn remove_frame_handler(&self, id: HandlerId) {
        if !self.core.frame_handlers.remove(id) {
            warn!(%id, "remove_frame_handler: unknown handler id");
        }
    }

    pub fn add_frame_transmit_handler(
        &self,
        handler: impl Fn(&CanFrameTransmitEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.transmit_handlers.add(handler)
    }

    pub fn remove_frame_transmit_handler(&self, id: HandlerId) {
        if !self.core.transmit_handlers.remove(id) {
            warn!(%id, "remove_frame_transmit_handler: unknown handler id");
        }
    }
}

#[cfg(test)]
#[path = "can_tests.rs"]
mod tests;
