// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! A federation participant: the facade over connection, service
//! discovery, message routing, orchestration, time synchronization and the
//! bus controllers.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use vib_core::ParticipantConfig;
//! use vib_participant::Participant;
//!
//! let participant =
//!     Participant::connect(ParticipantConfig::default(), "EcuSim", "127.0.0.1:8500").await?;
//! let can = participant.create_can_controller("CanCtrl", Some("CAN1"))?;
//! can.start();
//! # Ok(())
//! # }
//! ```

mod bus;
mod can;
mod connection;
mod discovery;
mod flexray;
mod lin;
mod logging;
mod orchestration;
mod participant;
mod pubsub;
mod router;
mod rpc;
mod sim_behavior;
#[cfg(test)]
mod test_support;
mod timesync;

pub use can::{CanController, CanFrameEvent, CanFrameTransmitEvent};
pub use connection::ConnectionError;
pub use discovery::ServiceDiscovery;
pub use flexray::{
    FlexrayController, FlexrayFrameEvent, FlexrayFrameTransmitEvent, FlexrayPocStatusEvent,
    FlexraySymbolEvent, FlexrayWakeupEvent,
};
pub use lin::{
    LinController, LinFrameResponseUpdateEvent, LinFrameStatusEvent, LinGoToSleepEvent,
    LinWakeupEvent,
};
pub use orchestration::{
    LifecycleService, SystemController, SystemMonitor,
};
pub use participant::Participant;
pub use pubsub::{DataMessageEvent, DataPublisher, DataSubscriber, PubSubSpec};
pub use rpc::{RpcCallEvent, RpcCallResultEvent, RpcClient, RpcServer};
pub use timesync::TimeProvider;
