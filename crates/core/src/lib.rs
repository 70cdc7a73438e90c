// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vib-core: data model and state machines of the Virtual Integration Bus.
//!
//! Everything in here is transport-agnostic: service identities, the
//! participant lifecycle, virtual-time types, the bus frame types with their
//! validation rules, the callback registry, and the participant
//! configuration document.

pub mod macros;

pub mod can;
pub mod config;
pub mod flexray;
pub mod handlers;
pub mod lin;
pub mod service;
pub mod sync;
pub mod time;

pub use can::{CanBaudRate, CanControllerMode, CanFrame, CanFrameFlags, CanTransmitStatus};
pub use config::{ConfigError, HealthCheckConfig, LoggingConfig, ParticipantConfig};
pub use flexray::{
    FlexrayChannel, FlexrayClusterParameters, FlexrayControllerConfig, FlexrayFrame,
    FlexrayHeader, FlexrayHostCommand, FlexrayNodeParameters, FlexrayPocState,
    FlexraySymbolPattern, FlexrayTransmissionMode, FlexrayTxBufferConfig,
};
pub use handlers::{HandlerId, HandlerIdSource, HandlerRegistry};
pub use lin::{
    go_to_sleep_frame, is_go_to_sleep_frame, LinChecksumModel, LinControllerMode,
    LinControllerStatus, LinFrame, LinFrameResponse, LinFrameResponseMode, LinFrameResponseType,
    LinFrameStatus, LinTransmitDirection,
};
pub use service::{ServiceDescriptor, ServiceId, ServiceType};
pub use sync::{
    aggregate_system_state, ParticipantState, ParticipantStatus, SystemCommandKind, SystemState,
};
pub use time::{duration_to_nanos, NextSimTask};

/// Errors raised synchronously on API misuse (calling an operation in a
/// state that does not permit it). No state change occurs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StateError(pub String);

impl StateError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
