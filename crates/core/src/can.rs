//! CAN data types: frames, controller modes, transmit status.

use serde::{Deserialize, Serialize};

/// Highest id expressible with 29-bit extended addressing.
pub const MAX_CAN_ID: u32 = 0x1FFF_FFFF;
/// Largest CAN FD payload.
pub const MAX_CAN_PAYLOAD: usize = 64;

/// Frame format flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrameFlags {
    /// Identifier extension (29-bit id).
    #[serde(default)]
    pub ide: bool,
    /// Remote transmission request.
    #[serde(default)]
    pub rtr: bool,
    /// FD format.
    #[serde(default)]
    pub fdf: bool,
    /// Bit rate switch (FD only).
    #[serde(default)]
    pub brs: bool,
}

/// A CAN / CAN FD frame at the semantic-field level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    pub can_id: u32,
    pub flags: CanFrameFlags,
    /// Data length code as transmitted on the wire.
    pub dlc: u8,
    pub payload: Vec<u8>,
}

impl CanFrame {
    pub fn new(can_id: u32, payload: Vec<u8>) -> Self {
        Self { can_id, flags: CanFrameFlags::default(), dlc: payload.len().min(15) as u8, payload }
    }

    /// Frame invariants: id within 29 bits, payload within CAN FD limits.
    pub fn validate(&self) -> Result<(), crate::StateError> {
        if self.can_id > MAX_CAN_ID {
            return Err(crate::StateError::new(format!(
                "CAN id {:#x} exceeds the 29-bit maximum",
                self.can_id
            )));
        }
        if self.payload.len() > MAX_CAN_PAYLOAD {
            return Err(crate::StateError::new(format!(
                "CAN payload of {} bytes exceeds the CAN FD maximum of {}",
                self.payload.len(),
                MAX_CAN_PAYLOAD
            )));
        }
        Ok(())
    }
}

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanControllerMode {
    Uninit,
    Stopped,
    Started,
    Sleep,
}

crate::simple_display! {
    CanControllerMode {
        Uninit => "uninit",
        Stopped => "stopped",
        Started => "started",
        Sleep => "sleep",
    }
}

/// Outcome of a transmit request, reported back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanTransmitStatus {
    Transmitted,
    Canceled,
    TransmitQueueFull,
}

crate::simple_display! {
    CanTransmitStatus {
        Transmitted => "transmitted",
        Canceled => "canceled",
        TransmitQueueFull => "transmit_queue_full",
    }
}

/// Nominal and data-phase baud rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanBaudRate {
    pub rate: u32,
    /// Data-phase rate for CAN FD; 0 when unused.
    #[serde(default)]
    pub fd_rate: u32,
}

#[cfg(test)]
#[path = "can_tests.rs"]
mod tests;
