//! LIN data types: frames, checksum models, response modes, frame status.

use serde::{Deserialize, Serialize};

/// LIN ids range 0–63.
pub const MAX_LIN_ID: u8 = 63;
/// Number of distinct LIN ids.
pub const LIN_ID_COUNT: usize = 64;
/// Largest LIN payload.
pub const MAX_LIN_DATA_LENGTH: u8 = 8;

/// Checksum model of a LIN frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinChecksumModel {
    #[default]
    Unknown,
    Classic,
    Enhanced,
}

/// A LIN frame at the semantic-field level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinFrame {
    /// Protected id, 0–63.
    pub id: u8,
    pub checksum_model: LinChecksumModel,
    /// Used bytes of `data`, ≤ 8.
    pub data_length: u8,
    pub data: [u8; 8],
}

impl LinFrame {
    pub fn new(id: u8, checksum_model: LinChecksumModel, data_length: u8, data: [u8; 8]) -> Self {
        Self { id, checksum_model, data_length, data }
    }

    pub fn validate(&self) -> Result<(), crate::StateError> {
        if self.id > MAX_LIN_ID {
            return Err(crate::StateError::new(format!("LIN id {} exceeds 63", self.id)));
        }
        if self.data_length > MAX_LIN_DATA_LENGTH {
            return Err(crate::StateError::new(format!(
                "LIN data length {} exceeds 8",
                self.data_length
            )));
        }
        Ok(())
    }
}

/// The well-known go-to-sleep frame. Recognized by value comparison of id
/// and data, never by a flag field.
pub fn go_to_sleep_frame() -> LinFrame {
    LinFrame {
        id: 0x3C,
        checksum_model: LinChecksumModel::Classic,
        data_length: 8,
        data: [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    }
}

/// True when `frame` matches the go-to-sleep frame byte for byte.
pub fn is_go_to_sleep_frame(frame: &LinFrame) -> bool {
    let sleep = go_to_sleep_frame();
    frame.id == sleep.id && frame.data == sleep.data
}

/// Role of a node on the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinControllerMode {
    #[default]
    Inactive,
    Master,
    Slave,
}

crate::simple_display! {
    LinControllerMode {
        Inactive => "inactive",
        Master => "master",
        Slave => "slave",
    }
}

/// Operational state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinControllerStatus {
    #[default]
    Unknown,
    Operational,
    Sleep,
    SleepPending,
}

crate::simple_display! {
    LinControllerStatus {
        Unknown => "unknown",
        Operational => "operational",
        Sleep => "sleep",
        SleepPending => "sleep_pending",
    }
}

/// What a node does when the id of its configured response is headed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinFrameResponseMode {
    #[default]
    Unused,
    /// Receive and validate the response against the configured frame.
    Rx,
    /// Provide the response whenever the id is headed.
    TxUnconditional,
}

/// Response configuration for one LIN id on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinFrameResponse {
    pub frame: LinFrame,
    pub response_mode: LinFrameResponseMode,
}

/// Who provides the response when a master sends a full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinFrameResponseType {
    /// The master provides the response itself.
    MasterResponse,
    /// One slave provides the response.
    SlaveResponse,
    /// Both the sending and receiving node are slaves.
    SlaveToSlave,
}

impl LinFrameResponseType {
    /// The response mode the master configures for itself when expanding a
    /// full-frame send.
    pub fn master_response_mode(self) -> LinFrameResponseMode {
        match self {
            LinFrameResponseType::MasterResponse => LinFrameResponseMode::TxUnconditional,
            LinFrameResponseType::SlaveResponse => LinFrameResponseMode::Rx,
            LinFrameResponseType::SlaveToSlave => LinFrameResponseMode::Unused,
        }
    }
}

/// Outcome of a headed frame as observed by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinFrameStatus {
    NotOk,
    LinTxOk,
    LinTxBusy,
    LinTxHeaderError,
    LinTxError,
    LinRxOk,
    LinRxBusy,
    LinRxError,
    LinRxNoResponse,
}

impl LinFrameStatus {
    /// Convert an RX status into the TX variant, used when this node itself
    /// provided the response.
    pub fn to_tx(self) -> LinFrameStatus {
        match self {
            LinFrameStatus::LinRxOk => LinFrameStatus::LinTxOk,
            LinFrameStatus::LinRxBusy => LinFrameStatus::LinTxBusy,
            LinFrameStatus::LinRxError => LinFrameStatus::LinTxError,
            other => other,
        }
    }
}

/// Direction of a wakeup pulse relative to the observing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinTransmitDirection {
    Tx,
    Rx,
}

#[cfg(test)]
#[path = "lin_tests.rs"]
mod tests;
