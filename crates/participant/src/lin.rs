//! LIN controller, trivial simulation.
//!
//! Every controller keeps a response table per known node. A master heading
//! an id resolves the transmission locally from those tables: no
//! TxUnconditional responder means no response, exactly one means success,
//! several mean a collision. Slaves recompute the status of an incoming
//! transmission from their own table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vib_core::lin::{LIN_ID_COUNT, MAX_LIN_DATA_LENGTH, MAX_LIN_ID};
use vib_core::{
    go_to_sleep_frame, is_go_to_sleep_frame, HandlerId, HandlerIdSource, HandlerRegistry,
    LinControllerMode, LinControllerStatus, LinFrame, LinFrameResponse, LinFrameResponseMode,
    LinFrameResponseType, LinFrameStatus, LinTransmitDirection, ServiceDescriptor, ServiceId,
    StateError,
};
use vib_wire::Message;

use crate::bus::BusHandle;
use crate::sim_behavior::BehaviorCell;

/// Outcome of a headed frame, delivered to frame status handlers.
#[derive(Debug, Clone)]
pub struct LinFrameStatusEvent {
    pub timestamp: i64,
    pub frame: LinFrame,
    pub status: LinFrameStatus,
}

/// The go-to-sleep frame was observed on the bus (slaves only).
#[derive(Debug, Clone)]
pub struct LinGoToSleepEvent {
    pub timestamp: i64,
}

/// A wakeup pulse was observed.
#[derive(Debug, Clone)]
pub struct LinWakeupEvent {
    pub timestamp: i64,
    pub direction: LinTransmitDirection,
}

/// A peer updated one of its frame responses.
#[derive(Debug, Clone)]
pub struct LinFrameResponseUpdateEvent {
    pub sender: String,
    pub response: LinFrameResponse,
}

/// What one controller knows about one node on the bus (including itself).
struct LinNode {
    mode: LinControllerMode,
    status: LinControllerStatus,
    responses: Vec<LinFrameResponse>,
}

impl LinNode {
    fn new() -> Self {
        Self {
            mode: LinControllerMode::Inactive,
            status: LinControllerStatus::Unknown,
            responses: (0..LIN_ID_COUNT).map(|_| LinFrameResponse::default()).collect(),
        }
    }

    fn update_responses(&mut self, responses: &[LinFrameResponse]) {
        for response in responses {
            let id = response.frame.id;
            if id > MAX_LIN_ID {
                warn!(id, "ignoring frame response update for out-of-range id");
                continue;
            }
            self.responses[id as usize] = response.clone();
        }
    }
}

struct LinState {
    mode: LinControllerMode,
    status: LinControllerStatus,
    nodes: HashMap<(String, ServiceId), LinNode>,
}

pub(crate) struct LinCore {
    pub descriptor: ServiceDescriptor,
    bus: BusHandle,
    pub behavior: BehaviorCell,
    state: Mutex<LinState>,
    frame_status_handlers: HandlerRegistry<LinFrameStatusEvent>,
    go_to_sleep_handlers: HandlerRegistry<LinGoToSleepEvent>,
    wakeup_handlers: HandlerRegistry<LinWakeupEvent>,
    response_update_handlers: HandlerRegistry<LinFrameResponseUpdateEvent>,
}

impl LinCore {
    pub fn new(bus: BusHandle, descriptor: ServiceDescriptor) -> Arc<Self> {
        let ids = HandlerIdSource::new();
        Arc::new(Self {
            behavior: BehaviorCell::new(&descriptor.network_name),
            descriptor,
            bus,
            state: Mutex::new(LinState {
                mode: LinControllerMode::Inactive,
                status: LinControllerStatus::Unknown,
                nodes: HashMap::new(),
            }),
            frame_status_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            go_to_sleep_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            wakeup_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            response_update_handlers: HandlerRegistry::new(ids),
        })
    }

    pub fn network(&self) -> &str {
        &self.descriptor.network_name
    }

    fn own_key(&self) -> (String, ServiceId) {
        self.descriptor.key()
    }

    fn require_operational(&self, api: &str) -> Result<(), StateError> {
        if self.state.lock().status != LinControllerStatus::Operational {
            return Err(StateError::new(format!(
                "{api} must only be called on an operational controller; is init missing?"
            )));
        }
        Ok(())
    }

    fn require_master(&self, api: &str) -> Result<(), StateError> {
        if self.state.lock().mode != LinControllerMode::Master {
            return Err(StateError::new(format!("{api} must only be called in master mode")));
        }
        Ok(())
    }

    pub fn init(
        &self,
        mode: LinControllerMode,
        baud_rate: u32,
        frame_responses: Vec<LinFrameResponse>,
    ) -> Result<(), StateError> {
        if mode == LinControllerMode::Inactive {
            return Err(StateError::new("init requires master or slave mode"));
        }
        {
            let mut state = self.state.lock();
            if state.mode != LinControllerMode::Inactive {
                return Err(StateError::new("controller is already initialized"));
            }
            state.mode = mode;
            state.status = LinControllerStatus::Operational;
            let node = state.nodes.entry(self.own_key()).or_insert_with(LinNode::new);
            node.mode = mode;
            node.status = LinControllerStatus::Operational;
            node.update_responses(&frame_responses);
        }
        self.send(Message::LinControllerConfig {
            controller_mode: mode,
            baud_rate,
            frame_responses,
        });
        Ok(())
    }

    pub fn mode(&self) -> LinControllerMode {
        self.state.lock().mode
    }

    pub fn status(&self) -> LinControllerStatus {
        self.state.lock().status
    }

    /// Route outbound through the current behavior: broadcast in trivial
    /// mode, targeted at the simulator in detailed mode.
    fn send(&self, msg: Message) {
        match self.behavior.snapshot().target() {
            Some(simulator) => self.bus.send_to(&self.descriptor, simulator, msg),
            None => self.bus.send(&self.descriptor, msg),
        }
    }

    pub fn send_frame(
        &self,
        frame: LinFrame,
        response_type: LinFrameResponseType,
    ) -> Result<(), StateError> {
        frame.validate()?;
        self.require_operational("send_frame")?;
        self.require_master("send_frame")?;

        if self.behavior.snapshot().is_trivial() {
            // Expand locally: update the own response table, then head the id.
            self.set_frame_response_internal(frame.clone(), response_type.master_response_mode());
            self.send_frame_header(frame.id)
        } else {
            self.send(Message::LinSendFrameRequest { frame, response_type });
            Ok(())
        }
    }

    pub fn send_frame_header(&self, id: u8) -> Result<(), StateError> {
        if id > MAX_LIN_ID {
            return Err(StateError::new(format!("LIN id {id} exceeds 63")));
        }
        self.require_operational("send_frame_header")?;
        self.require_master("send_frame_header")?;

        if !self.behavior.snapshot().is_trivial() {
            self.send(Message::LinSendFrameHeaderRequest { id });
            return Ok(());
        }

        // Resolve the transmission from the cached response tables.
        let timestamp = self.bus.now();
        let (responders, frame, own_mode) = {
            let state = self.state.lock();
            let mut responders = 0;
            let mut frame = LinFrame::default();
            for node in state.nodes.values() {
                if node.mode == LinControllerMode::Inactive
                    || node.status != LinControllerStatus::Operational
                {
                    continue;
                }
                let response = &node.responses[id as usize];
                if response.response_mode == LinFrameResponseMode::TxUnconditional {
                    frame = response.frame.clone();
                    responders += 1;
                }
            }
            let own_mode = state
                .nodes
                .get(&self.own_key())
                .map(|n| n.responses[id as usize].response_mode)
                .unwrap_or_default();
            (responders, frame, own_mode)
        };

        let mut frame = frame;
        frame.id = id;
        let status = match responders {
            0 => LinFrameStatus::LinRxNoResponse,
            1 => LinFrameStatus::LinRxOk,
            _ => LinFrameStatus::LinRxError,
        };

        self.send(Message::LinTransmission { timestamp, frame: frame.clone(), status });

        // Dispatch the outcome locally; a master that provided the response
        // itself observes the TX variant.
        let own_status = if own_mode == LinFrameResponseMode::TxUnconditional {
            status.to_tx()
        } else {
            status
        };
        self.frame_status_handlers.dispatch(&LinFrameStatusEvent {
            timestamp,
            frame,
            status: own_status,
        });
        Ok(())
    }

    fn set_frame_response_internal(&self, frame: LinFrame, mode: LinFrameResponseMode) {
        let response = LinFrameResponse { frame, response_mode: mode };
        {
            let mut state = self.state.lock();
            let node = state.nodes.entry(self.own_key()).or_insert_with(LinNode::new);
            node.update_responses(std::slice::from_ref(&response));
        }
        self.send(Message::LinFrameResponseUpdate { frame_responses: vec![response] });
    }

    pub fn set_frame_response(
        &self,
        frame: LinFrame,
        mode: LinFrameResponseMode,
    ) -> Result<(), StateError> {
        frame.validate()?;
        self.require_operational("set_frame_response")?;
        self.set_frame_response_internal(frame, mode);
        Ok(())
    }

    pub fn go_to_sleep(&self) -> Result<(), StateError> {
        self.require_master("go_to_sleep")?;

        if self.behavior.snapshot().is_trivial() {
            self.send(Message::LinTransmission {
                timestamp: self.bus.now(),
                frame: go_to_sleep_frame(),
                status: LinFrameStatus::LinRxOk,
            });
            self.set_controller_status(LinControllerStatus::Sleep);
        } else {
            self.send(Message::LinSendFrameRequest {
                frame: go_to_sleep_frame(),
                response_type: LinFrameResponseType::MasterResponse,
            });
            self.set_controller_status(LinControllerStatus::SleepPending);
        }
        Ok(())
    }

    pub fn wakeup(&self) -> Result<(), StateError> {
        if self.state.lock().mode == LinControllerMode::Inactive {
            return Err(StateError::new("wakeup must not be called before init"));
        }
        let timestamp = self.bus.now();
        // Peers see an RX pulse; in trivial mode the own handlers see the
        // TX side directly.
        let trivial = self.behavior.snapshot().is_trivial();
        self.send(Message::LinWakeupPulse { timestamp, direction: LinTransmitDirection::Rx });
        if trivial {
            self.wakeup_handlers
                .dispatch(&LinWakeupEvent { timestamp, direction: LinTransmitDirection::Tx });
        }
        self.set_controller_status(LinControllerStatus::Operational);
        Ok(())
    }

    /// Set the own status and tell the bus about it.
    fn set_controller_status(&self, status: LinControllerStatus) {
        {
            let mut state = self.state.lock();
            if state.status == status {
                debug!(%status, "controller status unchanged");
                return;
            }
            state.status = status;
            let key = self.own_key();
            if let Some(node) = state.nodes.get_mut(&key) {
                node.status = status;
            }
        }
        self.send(Message::LinControllerStatusUpdate { status });
    }

    // -- inbound, dispatcher only --

    pub fn on_transmission(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        frame: &LinFrame,
        wire_status: LinFrameStatus,
    ) {
        if !self.behavior.snapshot().allow_reception(sender) {
            return;
        }
        if frame.data_length > MAX_LIN_DATA_LENGTH {
            warn!(sender = %sender, length = frame.data_length, "transmission with invalid payload length");
            return;
        }
        if frame.id > MAX_LIN_ID {
            warn!(sender = %sender, id = frame.id, "transmission with invalid LIN id");
            return;
        }

        let (own_mode, response) = {
            let state = self.state.lock();
            let response = state
                .nodes
                .get(&self.own_key())
                .map(|n| n.responses[frame.id as usize].clone())
                .unwrap_or_default();
            (state.mode, response)
        };
        if own_mode == LinControllerMode::Inactive {
            warn!("inactive LIN controller received a transmission");
        }

        let is_sleep_frame = is_go_to_sleep_frame(frame);

        // Detailed mode delivers the simulator's status verbatim; trivial
        // mode recomputes it from the local response table.
        let status = if self.behavior.snapshot().is_trivial() {
            calc_frame_status(frame, wire_status, is_sleep_frame, &response)
        } else {
            wire_status
        };

        if status != LinFrameStatus::LinRxNoResponse {
            self.frame_status_handlers.dispatch(&LinFrameStatusEvent {
                timestamp,
                frame: frame.clone(),
                status,
            });
        }

        // Only slaves react to the go-to-sleep frame; the issuing master
        // already transitioned itself.
        if is_sleep_frame && own_mode == LinControllerMode::Slave {
            self.go_to_sleep_handlers.dispatch(&LinGoToSleepEvent { timestamp });
            self.set_controller_status(LinControllerStatus::Sleep);
        }
    }

    pub fn on_wakeup_pulse(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        direction: LinTransmitDirection,
    ) {
        if !self.behavior.snapshot().allow_reception(sender) {
            return;
        }
        self.wakeup_handlers.dispatch(&LinWakeupEvent { timestamp, direction });
        if self.state.lock().mode != LinControllerMode::Inactive {
            self.set_controller_status(LinControllerStatus::Operational);
        }
    }

    pub fn on_controller_config(
        &self,
        sender: &ServiceDescriptor,
        mode: LinControllerMode,
        frame_responses: &[LinFrameResponse],
    ) {
        {
            let mut state = self.state.lock();
            let node = state.nodes.entry(sender.key()).or_insert_with(LinNode::new);
            node.mode = mode;
            node.status = LinControllerStatus::Operational;
            node.update_responses(frame_responses);
        }
        self.dispatch_response_updates(sender, frame_responses);
    }

    pub fn on_frame_response_update(
        &self,
        sender: &ServiceDescriptor,
        frame_responses: &[LinFrameResponse],
    ) {
        {
            let mut state = self.state.lock();
            let node = state.nodes.entry(sender.key()).or_insert_with(LinNode::new);
            node.update_responses(frame_responses);
        }
        self.dispatch_response_updates(sender, frame_responses);
    }

    pub fn on_controller_status_update(
        &self,
        sender: &ServiceDescriptor,
        status: LinControllerStatus,
    ) {
        let mut state = self.state.lock();
        let node = state.nodes.entry(sender.key()).or_insert_with(LinNode::new);
        node.status = status;
    }

    fn dispatch_response_updates(
        &self,
        sender: &ServiceDescriptor,
        frame_responses: &[LinFrameResponse],
    ) {
        for response in frame_responses {
            self.response_update_handlers.dispatch(&LinFrameResponseUpdateEvent {
                sender: sender.to_string(),
                response: response.clone(),
            });
        }
    }
}

/// Status of an incoming transmission as observed by this node, from its
/// own response configuration.
fn calc_frame_status(
    frame: &LinFrame,
    wire_status: LinFrameStatus,
    is_sleep_frame: bool,
    response: &LinFrameResponse,
) -> LinFrameStatus {
    if is_sleep_frame {
        return LinFrameStatus::LinRxOk;
    }
    match response.response_mode {
        LinFrameResponseMode::Unused => LinFrameStatus::LinRxNoResponse,
        LinFrameResponseMode::Rx => {
            // Validate data length and checksum model against the
            // configured response.
            if response.frame.data_length != frame.data_length
                || response.frame.checksum_model != frame.checksum_model
            {
                LinFrameStatus::LinRxError
            } else {
                wire_status
            }
        }
        // This node provided the response itself.
        LinFrameResponseMode::TxUnconditional => wire_status.to_tx(),
    }
}

/// User handle of a LIN controller.
#[derive(Clone)]
pub struct LinController {
    core: Arc<LinCore>,
}

impl LinController {
    pub(crate) fn new(core: Arc<LinCore>) -> Self {
        Self { core }
    }

    /// Initialize the node; must precede any frame API.
    pub fn init(
        &self,
        mode: LinControllerMode,
        baud_rate: u32,
        frame_responses: Vec<LinFrameResponse>,
    ) -> Result<(), StateError> {
        self.core.init(mode, baud_rate, frame_responses)
    }

    pub fn mode(&self) -> LinControllerMode {
        self.core.mode()
    }

    pub fn status(&self) -> LinControllerStatus {
        self.core.status()
    }

    /// Master only: send a full frame (header plus the response source
    /// chosen by `response_type`).
    pub fn send_frame(
        &self,
        frame: LinFrame,
        response_type: LinFrameResponseType,
    ) -> Result<(), StateError> {
        self.core.send_frame(frame, response_type)
    }

    /// Master only: head an id and let the configured responders answer.
    pub fn send_frame_header(&self, id: u8) -> Result<(), StateError> {
        self.core.send_frame_header(id)
    }

    /// Configure this node's response for one id.
    pub fn set_frame_response(
        &self,
        frame: LinFrame,
        mode: LinFrameResponseMode,
    ) -> Result<(), StateError> {
        self.core.set_frame_response(frame, mode)
    }

    /// Master only: put the bus to sleep with the well-known frame.
    pub fn go_to_sleep(&self) -> Result<(), StateError> {
        self.core.go_to_sleep()
    }

    /// Wake the bus with a wakeup pulse.
    pub fn wakeup(&self) -> Result<(), StateError> {
        self.core.wakeup()
    }

    pub fn add_frame_status_handler(
        &self,
        handler: impl Fn(&LinFrameStatusEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.frame_status_handlers.add(handler)
    }

    pub fn remove_frame_status_handler(&self, id: HandlerId) {
        if !self.core.frame_status_handlers.remove(id) {
            warn!(%id, "remove_frame_status_handler: unknown handler id");
        }
    }

    pub fn add_go_to_sleep_handler(
        &self,
        handler: impl Fn(&LinGoToSleepEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.go_to_sleep_handlers.add(handler)
    }

    pub fn remove_go_to_sleep_handler(&self, id: HandlerId) {
        if !self.core.go_to_sleep_handlers.remove(id) {
            warn!(%id, "remove_go_to_sleep_handler: unknown handler id");
        }
    }

    pub fn add_wakeup_handler(
        &self,
        handler: impl Fn(&LinWakeupEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.wakeup_handlers.add(handler)
    }

    pub fn remove_wakeup_handler(&self, id: HandlerId) {
        if !self.core.wakeup_handlers.remove(id) {
            warn!(%id, "remove_wakeup_handler: unknown handler id");
        }
    }

    pub fn add_frame_response_update_handler(
        &self,
        handler: impl Fn(&LinFrameResponseUpdateEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.response_update_handlers.add(handler)
    }

    pub fn remove_frame_response_update_handler(&self, id: HandlerId) {
        if !self.core.response_update_handlers.remove(id) {
            warn!(%id, "remove_frame_response_update_handler: unknown handler id");
        }
    }
}

#[cfg(test)]
#[path = "lin_tests.rs"]
mod tests;
