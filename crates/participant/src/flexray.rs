//! FlexRay controller, trivial simulation.
//!
//! Configuration validates the cluster and node parameters against the
//! FlexRay 3.0.1 ranges and advances the POC to Ready. In trivial mode the
//! startup control flow is emulated: `run` emits a CAS/MTS symbol on both
//! channels and jumps straight to NormalActive, `wakeup` emits a WUS on the
//! configured wakeup channel and cycles Wakeup → Ready.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use vib_core::flexray::{
    FlexrayChannel, FlexrayControllerConfig, FlexrayFrame, FlexrayHeader, FlexrayPocState,
    FlexraySymbolPattern, FlexrayTxBufferConfig,
};
use vib_core::{ConfigError, HandlerId, HandlerIdSource, HandlerRegistry, ServiceDescriptor, StateError};
use vib_wire::Message;

use crate::bus::BusHandle;
use crate::sim_behavior::BehaviorCell;

/// A received FlexRay frame.
#[derive(Debug, Clone)]
pub struct FlexrayFrameEvent {
    pub timestamp: i64,
    pub channel: FlexrayChannel,
    pub frame: FlexrayFrame,
}

/// Acknowledgement for a frame this controller transmitted.
#[derive(Debug, Clone)]
pub struct FlexrayFrameTransmitEvent {
    pub timestamp: i64,
    pub tx_buffer_index: u16,
    pub channel: FlexrayChannel,
    pub frame: FlexrayFrame,
}

/// A symbol observed on the bus.
#[derive(Debug, Clone)]
pub struct FlexraySymbolEvent {
    pub timestamp: i64,
    pub channel: FlexrayChannel,
    pub pattern: FlexraySymbolPattern,
}

/// A wakeup symbol observed on the bus.
#[derive(Debug, Clone)]
pub struct FlexrayWakeupEvent {
    pub timestamp: i64,
    pub channel: FlexrayChannel,
    pub pattern: FlexraySymbolPattern,
}

/// Protocol operation control status change.
#[derive(Debug, Clone)]
pub struct FlexrayPocStatusEvent {
    pub timestamp: i64,
    pub state: FlexrayPocState,
}

struct FlexrayState {
    poc: FlexrayPocState,
    config: Option<FlexrayControllerConfig>,
}

pub(crate) struct FlexrayCore {
    pub descriptor: ServiceDescriptor,
    bus: BusHandle,
    pub behavior: BehaviorCell,
    state: Mutex<FlexrayState>,
    frame_handlers: HandlerRegistry<FlexrayFrameEvent>,
    frame_transmit_handlers: HandlerRegistry<FlexrayFrameTransmitEvent>,
    symbol_handlers: HandlerRegistry<FlexraySymbolEvent>,
    wakeup_handlers: HandlerRegistry<FlexrayWakeupEvent>,
    poc_handlers: HandlerRegistry<FlexrayPocStatusEvent>,
}

impl FlexrayCore {
    pub fn new(bus: BusHandle, descriptor: ServiceDescriptor) -> Arc<Self> {
        let ids = HandlerIdSource::new();
        Arc::new(Self {
            behavior: BehaviorCell::new(&descriptor.network_name),
            descriptor,
            bus,
            state: Mutex::new(FlexrayState { poc: FlexrayPocState::DefaultConfig, config: None }),
            frame_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            frame_transmit_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            symbol_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            wakeup_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            poc_handlers: HandlerRegistry::new(ids),
        })
    }

    pub fn network(&self) -> &str {
        &self.descriptor.network_name
    }

    fn send(&self, msg: Message) {
        match self.behavior.snapshot().target() {
            Some(simulator) => self.bus.send_to(&self.descriptor, simulator, msg),
            None => self.bus.send(&self.descriptor, msg),
        }
    }

    fn set_poc(&self, poc: FlexrayPocState) {
        self.state.lock().poc = poc;
        self.poc_handlers.dispatch(&FlexrayPocStatusEvent { timestamp: self.bus.now(), state: poc });
    }

    pub fn configure(&self, config: FlexrayControllerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        {
            let mut state = self.state.lock();
            state.config = Some(config.clone());
        }
        self.send(Message::FlexrayControllerConfig(config));
        // Trivial simulation skips Config and goes straight to Ready.
        self.set_poc(FlexrayPocState::Ready);
        Ok(())
    }

    fn require_configured(&self, api: &str) -> Result<(), StateError> {
        if self.state.lock().config.is_none() {
            return Err(StateError::new(format!("{api} requires a configured controller")));
        }
        Ok(())
    }

    pub fn reconfigure_tx_buffer(
        &self,
        index: u16,
        config: FlexrayTxBufferConfig,
    ) -> Result<(), StateError> {
        config.validate().map_err(|e| StateError::new(e.to_string()))?;
        {
            let mut state = self.state.lock();
            let Some(controller_config) = state.config.as_mut() else {
                return Err(StateError::new("reconfigure_tx_buffer requires a configured controller"));
            };
            let Some(slot) = controller_config.buffer_configs.get_mut(index as usize) else {
                return Err(StateError::new(format!("unconfigured tx buffer index {index}")));
            };
            *slot = config.clone();
        }
        self.send(Message::FlexrayTxBufferConfigUpdate { tx_buffer_index: index, config });
        Ok(())
    }

    pub fn update_tx_buffer(
        &self,
        index: u16,
        payload_data_valid: bool,
        payload: Vec<u8>,
    ) -> Result<(), StateError> {
        let buffer = {
            let state = self.state.lock();
            let Some(controller_config) = state.config.as_ref() else {
                return Err(StateError::new("update_tx_buffer requires a configured controller"));
            };
            let Some(buffer) = controller_config.buffer_configs.get(index as usize) else {
                return Err(StateError::new(format!("unconfigured tx buffer index {index}")));
            };
            buffer.clone()
        };

        if !self.behavior.snapshot().is_trivial() {
            self.send(Message::FlexrayTxBufferUpdate {
                tx_buffer_index: index,
                payload_data_valid,
                payload,
            });
            return Ok(());
        }

        // Derive the header from the buffer configuration.
        let header = FlexrayHeader {
            pp_indicator: buffer.has_payload_preamble_indicator,
            nf_indicator: payload_data_valid,
            frame_id: buffer.slot_id,
            payload_length: payload.len().div_ceil(2).min(u8::MAX as usize) as u8,
            header_crc: buffer.header_crc,
            cycle_count: 0,
        };
        let frame = FlexrayFrame { header, payload };
        let timestamp = self.bus.now();

        // One transmission per configured channel; AB transmits twice.
        let channels: &[FlexrayChannel] = match buffer.channels {
            FlexrayChannel::A => &[FlexrayChannel::A],
            FlexrayChannel::B => &[FlexrayChannel::B],
            FlexrayChannel::AB => &[FlexrayChannel::A, FlexrayChannel::B],
            FlexrayChannel::None => {
                return Err(StateError::new("tx buffer channel must not be none"));
            }
        };
        for channel in channels {
            self.send(Message::FlexrayFrameEvent {
                timestamp,
                channel: *channel,
                frame: frame.clone(),
            });
        }
        Ok(())
    }

    /// Start the communication cycle. In trivial mode this emits the
    /// CAS/MTS symbol on both channels and jumps to NormalActive.
    pub fn run(&self) -> Result<(), StateError> {
        self.require_configured("run")?;
        if !self.behavior.snapshot().is_trivial() {
            self.send(Message::FlexrayHostCommand {
                command: vib_core::FlexrayHostCommand::Run,
            });
            return Ok(());
        }
        let timestamp = self.bus.now();
        for channel in [FlexrayChannel::A, FlexrayChannel::B] {
            self.send(Message::FlexraySymbolEvent {
                timestamp,
                channel,
                pattern: FlexraySymbolPattern::CasMts,
            });
        }
        self.set_poc(FlexrayPocState::NormalActive);
        Ok(())
    }

    /// Initiate a wakeup. In trivial mode this emits a WUS on the
    /// configured wakeup channel and cycles Wakeup → Ready.
    pub fn wakeup(&self) -> Result<(), StateError> {
        self.require_configured("wakeup")?;
        let wakeup_channel = {
            let state = self.state.lock();
            state
                .config
                .as_ref()
                .map(|c| c.node_params.p_wakeup_channel)
                .unwrap_or(FlexrayChannel::A)
        };
        if !self.behavior.snapshot().is_trivial() {
            self.send(Message::FlexrayHostCommand {
                command: vib_core::FlexrayHostCommand::Wakeup,
            });
            return Ok(());
        }
        self.send(Message::FlexraySymbolEvent {
            timestamp: self.bus.now(),
            channel: wakeup_channel,
            pattern: FlexraySymbolPattern::Wus,
        });
        self.set_poc(FlexrayPocState::Wakeup);
        self.set_poc(FlexrayPocState::Ready);
        Ok(())
    }

    pub fn poc_state(&self) -> FlexrayPocState {
        self.state.lock().poc
    }

    // -- inbound, dispatcher only --

    pub fn on_frame_event(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        channel: FlexrayChannel,
        frame: &FlexrayFrame,
    ) {
        let behavior = self.behavior.snapshot();
        if !behavior.allow_reception(sender) {
            return;
        }
        self.frame_handlers.dispatch(&FlexrayFrameEvent {
            timestamp,
            channel,
            frame: frame.clone(),
        });

        // Trivial ACK: mirror the frame back to the sender with the same
        // timestamp and channel.
        if behavior.is_trivial() {
            self.bus.send_to(
                &self.descriptor,
                &sender.participant_name,
                Message::FlexrayFrameTransmitEvent {
                    timestamp,
                    tx_buffer_index: 0,
                    channel,
                    frame: frame.clone(),
                },
            );
        }
    }

    pub fn on_frame_transmit_event(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        tx_buffer_index: u16,
        channel: FlexrayChannel,
        frame: &FlexrayFrame,
    ) {
        if !self.behavior.snapshot().allow_reception(sender) {
            return;
        }
        self.frame_transmit_handlers.dispatch(&FlexrayFrameTransmitEvent {
            timestamp,
            tx_buffer_index,
            channel,
            frame: frame.clone(),
        });
    }

    pub fn on_symbol_event(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        channel: FlexrayChannel,
        pattern: FlexraySymbolPattern,
    ) {
        if !self.behavior.snapshot().allow_reception(sender) {
            return;
        }
        self.symbol_handlers.dispatch(&FlexraySymbolEvent { timestamp, channel, pattern });
        if matches!(pattern, FlexraySymbolPattern::Wus | FlexraySymbolPattern::Wudop) {
            self.wakeup_handlers.dispatch(&FlexrayWakeupEvent { timestamp, channel, pattern });
        }
    }

    pub fn on_poc_status_event(
        &self,
        sender: &ServiceDescriptor,
        timestamp: i64,
        state: FlexrayPocState,
    ) {
        // Only a detailed simulator drives our POC from outside.
        if !self.behavior.snapshot().allow_reception(sender) {
            return;
        }
        if self.behavior.snapshot().is_trivial() {
            return;
        }
        self.state.lock().poc = state;
        self.poc_handlers.dispatch(&FlexrayPocStatusEvent { timestamp, state });
    }
}

/// User handle of a FlexRay controller.
#[derive(Clone)]
pub struct FlexrayController {
    core: Arc<FlexrayCore>,
}

impl FlexrayController {
    pub(crate) fn new(core: Arc<FlexrayCore>) -> Self {
        Self { core }
    }

    /// Validate and apply the cluster/node/buffer configuration; the POC
    /// advances to Ready.
    pub fn configure(&self, config: FlexrayControllerConfig) -> Result<(), ConfigError> {
        self.core.configure(config)
    }

    /// Replace the configuration of an existing TX buffer.
    pub fn reconfigure_tx_buffer(
        &self,
        index: u16,
        config: FlexrayTxBufferConfig,
    ) -> Result<(), StateError> {
        self.core.reconfigure_tx_buffer(index, config)
    }

    /// Transmit the payload through a configured TX buffer, once per
    /// configured channel.
    pub fn update_tx_buffer(
        &self,
        index: u16,
        payload_data_valid: bool,
        payload: Vec<u8>,
    ) -> Result<(), StateError> {
        self.core.update_tx_buffer(index, payload_data_valid, payload)
    }

    pub fn run(&self) -> Result<(), StateError> {
        self.core.run()
    }

    pub fn wakeup(&self) -> Result<(), StateError> {
        self.core.wakeup()
    }

    pub fn poc_state(&self) -> FlexrayPocState {
        self.core.poc_state()
    }

    pub fn add_frame_handler(
        &self,
        handler: impl Fn(&FlexrayFrameEvent) + Send + Sync + 'static,
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
        handler: impl Fn(&FlexrayFrameTransmitEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.frame_transmit_handlers.add(handler)
    }

    pub fn remove_frame_transmit_handler(&self, id: HandlerId) {
        if !self.core.frame_transmit_handlers.remove(id) {
            warn!(%id, "remove_frame_transmit_handler: unknown handler id");
        }
    }

    pub fn add_symbol_handler(
        &self,
        handler: impl Fn(&FlexraySymbolEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.symbol_handlers.add(handler)
    }

    pub fn remove_symbol_handler(&self, id: HandlerId) {
        if !self.core.symbol_handlers.remove(id) {
            warn!(%id, "remove_symbol_handler: unknown handler id");
        }
    }

    pub fn add_wakeup_handler(
        &self,
        handler: impl Fn(&FlexrayWakeupEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.wakeup_handlers.add(handler)
    }

    pub fn remove_wakeup_handler(&self, id: HandlerId) {
        if !self.core.wakeup_handlers.remove(id) {
            warn!(%id, "remove_wakeup_handler: unknown handler id");
        }
    }

    /// Register for POC status changes (the newer status API).
    pub fn add_poc_status_handler(
        &self,
        handler: impl Fn(&FlexrayPocStatusEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.poc_handlers.add(handler)
    }

    pub fn remove_poc_status_handler(&self, id: HandlerId) {
        if !self.core.poc_handlers.remove(id) {
            warn!(%id, "remove_poc_status_handler: unknown handler id");
        }
    }
}

#[cfg(test)]
#[path = "flexray_tests.rs"]
mod tests;
