//! Typed message routing: every inbound bus message is matched on its kind
//! and delivered to the registered controllers of the matching network,
//! with the sender's own controller suppressed.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use vib_core::ServiceDescriptor;
use vib_wire::{Envelope, Message};

use crate::can::CanCore;
use crate::flexray::FlexrayCore;
use crate::lin::LinCore;
use crate::pubsub::SubscriberCore;
use crate::rpc::{RpcClientCore, RpcServerCore};

#[derive(Default)]
pub(crate) struct Router {
    can: Mutex<Vec<Arc<CanCore>>>,
    lin: Mutex<Vec<Arc<LinCore>>>,
    flexray: Mutex<Vec<Arc<FlexrayCore>>>,
    subscribers: Mutex<Vec<Arc<SubscriberCore>>>,
    rpc_servers: Mutex<Vec<Arc<RpcServerCore>>>,
    rpc_clients: Mutex<Vec<Arc<RpcClientCore>>>,
}

/// Receivers on the sender's network, excluding the sending endpoint
/// itself. The registry snapshot is taken before dispatch so handlers may
/// create controllers without deadlocking.
fn targets<C>(
    list: &Mutex<Vec<Arc<C>>>,
    sender: &ServiceDescriptor,
    network: impl Fn(&C) -> bool,
    descriptor: impl Fn(&C) -> ServiceDescriptor,
) -> Vec<Arc<C>> {
    list.lock()
        .iter()
        .filter(|c| network(c) && !descriptor(c).is_same_endpoint(sender))
        .cloned()
        .collect()
}

impl Router {
    pub fn register_can(&self, core: Arc<CanCore>) {
        self.can.lock().push(core);
    }

    pub fn register_lin(&self, core: Arc<LinCore>) {
        self.lin.lock().push(core);
    }

    pub fn register_flexray(&self, core: Arc<FlexrayCore>) {
        self.flexray.lock().push(core);
    }

    pub fn register_subscriber(&self, core: Arc<SubscriberCore>) {
        self.subscribers.lock().push(core);
    }

    pub fn register_rpc_server(&self, core: Arc<RpcServerCore>) {
        self.rpc_servers.lock().push(core);
    }

    pub fn register_rpc_client(&self, core: Arc<RpcClientCore>) {
        self.rpc_clients.lock().push(core);
    }

    fn can_targets(&self, sender: &ServiceDescriptor) -> Vec<Arc<CanCore>> {
        targets(
            &self.can,
            sender,
            |c| c.network() == sender.network_name,
            |c| c.descriptor.clone(),
        )
    }

    fn lin_targets(&self, sender: &ServiceDescriptor) -> Vec<Arc<LinCore>> {
        targets(
            &self.lin,
            sender,
            |c| c.network() == sender.network_name,
            |c| c.descriptor.clone(),
        )
    }

    fn flexray_targets(&self, sender: &ServiceDescriptor) -> Vec<Arc<FlexrayCore>> {
        targets(
            &self.flexray,
            sender,
            |c| c.network() == sender.network_name,
            |c| c.descriptor.clone(),
        )
    }

    /// Deliver a bus/data/rpc message. Targeted-delivery and orchestration
    /// filtering has already happened in the dispatcher.
    pub fn dispatch(&self, envelope: &Envelope) {
        let sender = &envelope.sender;
        match &envelope.msg {
            // -- can --
            Message::CanFrameEvent { timestamp, transmit_id, frame } => {
                for c in self.can_targets(sender) {
                    c.on_frame_event(sender, *timestamp, *transmit_id, frame);
                }
            }
            Message::CanFrameTransmitEvent { timestamp, transmit_id, status } => {
                for c in self.can_targets(sender) {
                    c.on_frame_transmit_event(sender, *timestamp, *transmit_id, *status);
                }
            }
            Message::CanControllerStatus { mode } => {
                for c in self.can_targets(sender) {
                    c.on_controller_status(sender, *mode);
                }
            }
            Message::CanConfigureBaudrate(_) | Message::CanSetControllerMode { .. } => {
                // Consumed by a detailed network simulator only.
                debug!(msg = envelope.msg.name(), "ignored in trivial simulation");
            }

            // -- lin --
            Message::LinTransmission { timestamp, frame, status } => {
                for c in self.lin_targets(sender) {
                    c.on_transmission(sender, *timestamp, frame, *status);
                }
            }
            Message::LinWakeupPulse { timestamp, direction } => {
                for c in self.lin_targets(sender) {
                    c.on_wakeup_pulse(sender, *timestamp, *direction);
                }
            }
            Message::LinControllerConfig { controller_mode, frame_responses, .. } => {
                for c in self.lin_targets(sender) {
                    c.on_controller_config(sender, *controller_mode, frame_responses);
                }
            }
            Message::LinControllerStatusUpdate { status } => {
                for c in self.lin_targets(sender) {
                    c.on_controller_status_update(sender, *status);
                }
            }
            Message::LinFrameResponseUpdate { frame_responses } => {
                for c in self.lin_targets(sender) {
                    c.on_frame_response_update(sender, frame_responses);
                }
            }
            Message::LinSendFrameRequest { .. } | Message::LinSendFrameHeaderRequest { .. } => {
                // Requests are answered by a detailed network simulator.
                debug!(msg = envelope.msg.name(), "ignored in trivial simulation");
            }

            // -- flexray --
            Message::FlexrayFrameEvent { timestamp, channel, frame } => {
                for c in self.flexray_targets(sender) {
                    c.on_frame_event(sender, *timestamp, *channel, frame);
                }
            }
            Message::FlexrayFrameTransmitEvent { timestamp, tx_buffer_index, channel, frame } => {
                for c in self.flexray_targets(sender) {
                    c.on_frame_transmit_event(sender, *timestamp, *tx_buffer_index, *channel, frame);
                }
            }
            Message::FlexraySymbolEvent { timestamp, channel, pattern } => {
                for c in self.flexray_targets(sender) {
                    c.on_symbol_event(sender, *timestamp, *channel, *pattern);
                }
            }
            Message::FlexrayPocStatusEvent { timestamp, state } => {
                for c in self.flexray_targets(sender) {
                    c.on_poc_status_event(sender, *timestamp, *state);
                }
            }
            Message::FlexrayHostCommand { .. }
            | Message::FlexrayControllerConfig(_)
            | Message::FlexrayTxBufferConfigUpdate { .. }
            | Message::FlexrayTxBufferUpdate { .. } => {
                debug!(msg = envelope.msg.name(), "ignored in trivial simulation");
            }

            // -- data & rpc --
            Message::DataMessageEvent { timestamp, data } => {
                let subscribers = targets(
                    &self.subscribers,
                    sender,
                    |s| s.topic() == sender.network_name,
                    |s| s.descriptor.clone(),
                );
                for s in subscribers {
                    s.on_data(sender, *timestamp, data);
                }
            }
            Message::RpcFunctionCall { timestamp, call_id, data } => {
                let servers = targets(
                    &self.rpc_servers,
                    sender,
                    |s| s.function_network() == sender.network_name,
                    |s| s.descriptor.clone(),
                );
                for s in servers {
                    s.on_call(sender, *timestamp, *call_id, data);
                }
            }
            Message::RpcFunctionCallResponse { timestamp, call_id, data } => {
                let clients = targets(
                    &self.rpc_clients,
                    sender,
                    |c| c.function_network() == sender.network_name,
                    |c| c.descriptor.clone(),
                );
                for c in clients {
                    c.on_result(sender, *timestamp, *call_id, data);
                }
            }

            // -- logging --
            Message::LogMsg(log) => {
                info!(
                    target: crate::logging::REMOTE_LOG_TARGET,
                    from = %sender.participant_name,
                    level = %log.level,
                    origin = %log.target,
                    "{}", log.body
                );
            }

            // Orchestration and discovery are handled by the dispatcher.
            _ => {
                debug!(msg = envelope.msg.name(), "unrouted message kind");
            }
        }
    }
}
