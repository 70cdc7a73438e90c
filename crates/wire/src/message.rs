//! Typed wire messages.
//!
//! Serializes with `{"type": "kind:name", ...fields}` format, one tag per
//! message kind; dispatch is a pattern match on the enum.

use serde::{Deserialize, Serialize};

use vib_core::can::CanBaudRate;
use vib_core::flexray::{
    FlexrayChannel, FlexrayControllerConfig, FlexrayFrame, FlexrayHostCommand, FlexrayPocState,
    FlexraySymbolPattern, FlexrayTxBufferConfig,
};
use vib_core::lin::{
    LinControllerMode, LinControllerStatus, LinFrame, LinFrameResponse, LinFrameResponseType,
    LinFrameStatus, LinTransmitDirection,
};
use vib_core::sync::{ParticipantStatus, SystemCommandKind};
use vib_core::{
    CanControllerMode, CanFrame, CanTransmitStatus, NextSimTask, ServiceDescriptor,
};

/// Version of the registry handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Created/removed marker of a service discovery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryEventKind {
    ServiceCreated,
    ServiceRemoved,
}

/// All services a participant has registered, published at connect time and
/// kept current by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantAnnouncement {
    pub participant_name: String,
    pub services: Vec<ServiceDescriptor>,
}

/// A remotely forwarded log record (the `Remote` log sink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMsg {
    pub level: String,
    pub target: String,
    pub body: String,
}

/// Every typed message the federation exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // -- service discovery --
    #[serde(rename = "svc:announcement")]
    ParticipantAnnouncement(ParticipantAnnouncement),

    #[serde(rename = "svc:discovery")]
    ServiceDiscoveryEvent { kind: DiscoveryEventKind, service: ServiceDescriptor },

    // -- orchestration --
    #[serde(rename = "sync:system-command")]
    SystemCommand { kind: SystemCommandKind },

    /// Superseded by the coordinated lifecycle; retained for wire
    /// compatibility with older system controllers.
    #[serde(rename = "sync:participant-command")]
    ParticipantCommand { participant: String },

    #[serde(rename = "sync:participant-status")]
    ParticipantStatus(ParticipantStatus),

    #[serde(rename = "sync:workflow-config")]
    WorkflowConfiguration { required_participant_names: Vec<String> },

    #[serde(rename = "sync:next-sim-task")]
    NextSimTask(NextSimTask),

    // -- can --
    #[serde(rename = "can:frame")]
    CanFrameEvent { timestamp: i64, transmit_id: u32, frame: CanFrame },

    #[serde(rename = "can:frame-transmit")]
    CanFrameTransmitEvent { timestamp: i64, transmit_id: u32, status: CanTransmitStatus },

    #[serde(rename = "can:controller-status")]
    CanControllerStatus { mode: CanControllerMode },

    #[serde(rename = "can:configure-baudrate")]
    CanConfigureBaudrate(CanBaudRate),

    #[serde(rename = "can:set-controller-mode")]
    CanSetControllerMode { mode: CanControllerMode },

    // -- lin --
    #[serde(rename = "lin:send-frame-request")]
    LinSendFrameRequest { frame: LinFrame, response_type: LinFrameResponseType },

    #[serde(rename = "lin:send-frame-header-request")]
    LinSendFrameHeaderRequest { id: u8 },

    #[serde(rename = "lin:transmission")]
    LinTransmission { timestamp: i64, frame: LinFrame, status: LinFrameStatus },

    #[serde(rename = "lin:wakeup-pulse")]
    LinWakeupPulse { timestamp: i64, direction: LinTransmitDirection },

    #[serde(rename = "lin:controller-config")]
    LinControllerConfig {
        controller_mode: LinControllerMode,
        baud_rate: u32,
        frame_responses: Vec<LinFrameResponse>,
    },

    #[serde(rename = "lin:controller-status-update")]
    LinControllerStatusUpdate { status: LinControllerStatus },

    #[serde(rename = "lin:frame-response-update")]
    LinFrameResponseUpdate { frame_responses: Vec<LinFrameResponse> },

    // -- flexray --
    #[serde(rename = "flexray:frame")]
    FlexrayFrameEvent { timestamp: i64, channel: FlexrayChannel, frame: FlexrayFrame },

    #[serde(rename = "flexray:frame-transmit")]
    FlexrayFrameTransmitEvent {
        timestamp: i64,
        tx_buffer_index: u16,
        channel: FlexrayChannel,
        frame: FlexrayFrame,
    },

    #[serde(rename = "flexray:symbol")]
    FlexraySymbolEvent { timestamp: i64, channel: FlexrayChannel, pattern: FlexraySymbolPattern },

    #[serde(rename = "flexray:host-command")]
    FlexrayHostCommand { command: FlexrayHostCommand },

    #[serde(rename = "flexray:controller-config")]
    FlexrayControllerConfig(FlexrayControllerConfig),

    #[serde(rename = "flexray:tx-buffer-config-update")]
    FlexrayTxBufferConfigUpdate { tx_buffer_index: u16, config: FlexrayTxBufferConfig },

    #[serde(rename = "flexray:tx-buffer-update")]
    FlexrayTxBufferUpdate { tx_buffer_index: u16, payload_data_valid: bool, payload: Vec<u8> },

    #[serde(rename = "flexray:poc-status")]
    FlexrayPocStatusEvent { timestamp: i64, state: FlexrayPocState },

    // -- data & rpc --
    #[serde(rename = "data:message")]
    DataMessageEvent { timestamp: i64, data: Vec<u8> },

    #[serde(rename = "rpc:call")]
    RpcFunctionCall { timestamp: i64, call_id: u64, data: Vec<u8> },

    #[serde(rename = "rpc:call-response")]
    RpcFunctionCallResponse { timestamp: i64, call_id: u64, data: Vec<u8> },

    // -- logging --
    #[serde(rename = "log:msg")]
    LogMsg(LogMsg),
}

impl Message {
    /// Stable name of the message kind, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::ParticipantAnnouncement(..) => "svc:announcement",
            Message::ServiceDiscoveryEvent { .. } => "svc:discovery",
            Message::SystemCommand { .. } => "sync:system-command",
            Message::ParticipantCommand { .. } => "sync:participant-command",
            Message::ParticipantStatus(..) => "sync:participant-status",
            Message::WorkflowConfiguration { .. } => "sync:workflow-config",
            Message::NextSimTask(..) => "sync:next-sim-task",
            Message::CanFrameEvent { .. } => "can:frame",
            Message::CanFrameTransmitEvent { .. } => "can:frame-transmit",
            Message::CanControllerStatus { .. } => "can:controller-status",
            Message::CanConfigureBaudrate(..) => "can:configure-baudrate",
            Message::CanSetControllerMode { .. } => "can:set-controller-mode",
            Message::LinSendFrameRequest { .. } => "lin:send-frame-request",
            Message::LinSendFrameHeaderRequest { .. } => "lin:send-frame-header-request",
            Message::LinTransmission { .. } => "lin:transmission",
            Message::LinWakeupPulse { .. } => "lin:wakeup-pulse",
            Message::LinControllerConfig { .. } => "lin:controller-config",
            Message::LinControllerStatusUpdate { .. } => "lin:controller-status-update",
            Message::LinFrameResponseUpdate { .. } => "lin:frame-response-update",
            Message::FlexrayFrameEvent { .. } => "flexray:frame",
            Message::FlexrayFrameTransmitEvent { .. } => "flexray:frame-transmit",
            Message::FlexraySymbolEvent { .. } => "flexray:symbol",
            Message::FlexrayHostCommand { .. } => "flexray:host-command",
            Message::FlexrayControllerConfig(..) => "flexray:controller-config",
            Message::FlexrayTxBufferConfigUpdate { .. } => "flexray:tx-buffer-config-update",
            Message::FlexrayTxBufferUpdate { .. } => "flexray:tx-buffer-update",
            Message::FlexrayPocStatusEvent { .. } => "flexray:poc-status",
            Message::DataMessageEvent { .. } => "data:message",
            Message::RpcFunctionCall { .. } => "rpc:call",
            Message::RpcFunctionCallResponse { .. } => "rpc:call-response",
            Message::LogMsg(..) => "log:msg",
        }
    }
}

/// A routed message: the payload plus its sender descriptor and, for
/// targeted delivery, the receiving participant's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ServiceDescriptor,
    /// Target participant for unicast delivery; `None` broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub msg: Message,
}

impl Envelope {
    pub fn broadcast(sender: ServiceDescriptor, msg: Message) -> Self {
        Self { sender, to: None, msg }
    }

    pub fn targeted(sender: ServiceDescriptor, to: impl Into<String>, msg: Message) -> Self {
        Self { sender, to: Some(to.into()), msg }
    }
}

/// Top-level frames exchanged with the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireFrame {
    /// First frame a connecting participant sends.
    #[serde(rename = "ctl:hello")]
    Hello { participant_name: String, version: u32 },

    /// Registry reply to `Hello`: everything currently known.
    #[serde(rename = "ctl:welcome")]
    Welcome { announcements: Vec<ParticipantAnnouncement> },

    /// Registry reply when the connection is not accepted.
    #[serde(rename = "ctl:refused")]
    Refused { reason: String },

    /// A peer's connection went away; receivers synthesize ServiceRemoved
    /// events for its descriptors.
    #[serde(rename = "ctl:peer-gone")]
    PeerGone { participant_name: String },

    /// A relayed participant message.
    #[serde(rename = "msg")]
    Msg(Envelope),
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
