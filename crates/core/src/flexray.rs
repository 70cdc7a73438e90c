//! FlexRay data types: cluster/node parameters with their FlexRay 3.0.1
//! ranges, POC states, frames, symbols and TX buffer configuration.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// FlexRay channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexrayChannel {
    None,
    A,
    B,
    #[serde(rename = "ab")]
    AB,
}

crate::simple_display! {
    FlexrayChannel {
        None => "none",
        A => "A",
        B => "B",
        AB => "AB",
    }
}

/// Protocol operation control states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexrayPocState {
    #[default]
    DefaultConfig,
    Config,
    Ready,
    Startup,
    Wakeup,
    NormalActive,
    NormalPassive,
    Halt,
}

crate::simple_display! {
    FlexrayPocState {
        DefaultConfig => "default_config",
        Config => "config",
        Ready => "ready",
        Startup => "startup",
        Wakeup => "wakeup",
        NormalActive => "normal_active",
        NormalPassive => "normal_passive",
        Halt => "halt",
    }
}

/// Symbol patterns transmitted outside the static/dynamic segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexraySymbolPattern {
    /// Collision avoidance symbol / media access test symbol.
    CasMts,
    /// Wakeup symbol.
    Wus,
    /// Wakeup during operation pattern.
    Wudop,
}

/// Global cluster parameters, validated against the FlexRay 3.0.1 ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexrayClusterParameters {
    pub g_coldstart_attempts: u8,
    pub g_cycle_count_max: u8,
    pub gd_action_point_offset: u16,
    pub gd_dynamic_slot_idle_phase: u16,
    pub gd_mini_slot: u16,
    pub gd_mini_slot_action_point_offset: u16,
    pub gd_static_slot: u16,
    pub gd_symbol_window: u16,
    pub gd_symbol_window_action_point_offset: u16,
    pub gd_tss_transmitter: u16,
    pub gd_wakeup_tx_active: u16,
    pub gd_wakeup_tx_idle: u16,
    pub g_listen_noise: u8,
    pub g_macro_per_cycle: u16,
    pub g_max_without_clock_correction_fatal: u8,
    pub g_max_without_clock_correction_passive: u8,
    pub g_number_of_mini_slots: u16,
    pub g_number_of_static_slots: u16,
    pub g_payload_length_static: u16,
    pub g_sync_frame_id_count_max: u8,
}

fn check(name: &str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Misconfiguration(format!(
            "{name} must be in range {min} - {max}"
        )));
    }
    Ok(())
}

impl FlexrayClusterParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("gColdstartAttempts", self.g_coldstart_attempts.into(), 2, 31)?;
        if self.g_cycle_count_max % 2 != 1 {
            return Err(ConfigError::Misconfiguration(
                "gCycleCountMax must be an odd value".into(),
            ));
        }
        check("gCycleCountMax", self.g_cycle_count_max.into(), 7, 63)?;
        check("gdActionPointOffset", self.gd_action_point_offset.into(), 1, 63)?;
        check("gdDynamicSlotIdlePhase", self.gd_dynamic_slot_idle_phase.into(), 0, 2)?;
        check("gdMiniSlot", self.gd_mini_slot.into(), 2, 63)?;
        check("gdMiniSlotActionPointOffset", self.gd_mini_slot_action_point_offset.into(), 1, 31)?;
        check("gdStaticSlot", self.gd_static_slot.into(), 3, 664)?;
        check("gdSymbolWindow", self.gd_symbol_window.into(), 0, 162)?;
        check(
            "gdSymbolWindowActionPointOffset",
            self.gd_symbol_window_action_point_offset.into(),
            1,
            63,
        )?;
        check("gdTSSTransmitter", self.gd_tss_transmitter.into(), 1, 15)?;
        check("gdWakeupTxActive", self.gd_wakeup_tx_active.into(), 15, 60)?;
        check("gdWakeupTxIdle", self.gd_wakeup_tx_idle.into(), 45, 180)?;
        check("gListenNoise", self.g_listen_noise.into(), 2, 16)?;
        check("gMacroPerCycle", self.g_macro_per_cycle.into(), 8, 16000)?;
        check(
            "gMaxWithoutClockCorrectionFatal",
            self.g_max_without_clock_correction_fatal.into(),
            1,
            15,
        )?;
        check(
            "gMaxWithoutClockCorrectionPassive",
            self.g_max_without_clock_correction_passive.into(),
            1,
            15,
        )?;
        check("gNumberOfMiniSlots", self.g_number_of_mini_slots.into(), 0, 7988)?;
        check("gNumberOfStaticSlots", self.g_number_of_static_slots.into(), 2, 1023)?;
        check("gPayloadLengthStatic", self.g_payload_length_static.into(), 0, 127)?;
        check("gSyncFrameIDCountMax", self.g_sync_frame_id_count_max.into(), 2, 15)?;
        Ok(())
    }
}

/// Node-local parameters, validated against the FlexRay 3.0.1 ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexrayNodeParameters {
    pub p_allow_halt_due_to_clock: u8,
    pub p_allow_passive_to_active: u8,
    pub p_channels: FlexrayChannel,
    pub p_cluster_drift_damping: u8,
    pub pd_accepted_startup_range: u32,
    pub pd_listen_timeout: u32,
    pub p_key_slot_id: u16,
    pub p_key_slot_only_enabled: u8,
    pub p_key_slot_used_for_startup: u8,
    pub p_key_slot_used_for_sync: u8,
    pub p_latest_tx: u16,
    pub p_macro_initial_offset_a: u8,
    pub p_macro_initial_offset_b: u8,
    pub p_micro_initial_offset_a: u8,
    pub p_micro_initial_offset_b: u8,
    pub p_micro_per_cycle: u32,
    pub p_offset_correction_out: u16,
    pub p_offset_correction_start: u16,
    pub p_rate_correction_out: u16,
    pub p_wakeup_channel: FlexrayChannel,
    pub p_wakeup_pattern: u8,
    pub p_samples_per_microtick: u8,
}

impl FlexrayNodeParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("pAllowHaltDueToClock", self.p_allow_halt_due_to_clock.into(), 0, 1)?;
        check("pAllowPassiveToActive", self.p_allow_passive_to_active.into(), 0, 31)?;
        check("pClusterDriftDamping", self.p_cluster_drift_damping.into(), 0, 10)?;
        check("pdAcceptedStartupRange", self.pd_accepted_startup_range.into(), 29, 2743)?;
        check("pdListenTimeout", self.pd_listen_timeout.into(), 1926, 2_567_692)?;
        check("pKeySlotId", self.p_key_slot_id.into(), 0, 1023)?;
        check("pKeySlotOnlyEnabled", self.p_key_slot_only_enabled.into(), 0, 1)?;
        check("pKeySlotUsedForStartup", self.p_key_slot_used_for_startup.into(), 0, 1)?;
        check("pKeySlotUsedForSync", self.p_key_slot_used_for_sync.into(), 0, 1)?;
        check("pLatestTx", self.p_latest_tx.into(), 0, 7988)?;
        check("pMacroInitialOffsetA", self.p_macro_initial_offset_a.into(), 2, 68)?;
        check("pMacroInitialOffsetB", self.p_macro_initial_offset_b.into(), 2, 68)?;
        check("pMicroInitialOffsetA", self.p_micro_initial_offset_a.into(), 0, 239)?;
        check("pMicroInitialOffsetB", self.p_micro_initial_offset_b.into(), 0, 239)?;
        check("pMicroPerCycle", self.p_micro_per_cycle.into(), 960, 1_280_000)?;
        check("pOffsetCorrectionOut", self.p_offset_correction_out.into(), 15, 16082)?;
        check("pOffsetCorrectionStart", self.p_offset_correction_start.into(), 7, 15999)?;
        check("pRateCorrectionOut", self.p_rate_correction_out.into(), 3, 3846)?;
        check("pWakeupPattern", self.p_wakeup_pattern.into(), 0, 63)?;
        check("pSamplesPerMicrotick", self.p_samples_per_microtick.into(), 1, 2)?;
        Ok(())
    }
}

/// Transmission mode of a TX buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexrayTransmissionMode {
    #[default]
    SingleShot,
    Continuous,
}

/// Static configuration of one TX buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexrayTxBufferConfig {
    pub channels: FlexrayChannel,
    /// Slot this buffer transmits in, 1–2047.
    pub slot_id: u16,
    /// Offset within the 64-cycle counting scheme.
    pub offset: u8,
    pub repetition: u8,
    pub has_payload_preamble_indicator: bool,
    pub header_crc: u16,
    pub transmission_mode: FlexrayTransmissionMode,
}

/// Lowest valid slot id.
pub const MIN_FLEXRAY_SLOT_ID: u16 = 1;
/// Highest valid slot id.
pub const MAX_FLEXRAY_SLOT_ID: u16 = 2047;

impl FlexrayTxBufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_id < MIN_FLEXRAY_SLOT_ID || self.slot_id > MAX_FLEXRAY_SLOT_ID {
            return Err(ConfigError::Misconfiguration(format!(
                "slotId must be in range {MIN_FLEXRAY_SLOT_ID} - {MAX_FLEXRAY_SLOT_ID}"
            )));
        }
        if matches!(self.channels, FlexrayChannel::None) {
            return Err(ConfigError::Misconfiguration("channels must not be none".into()));
        }
        Ok(())
    }
}

/// Header of a FlexRay frame as derived from its TX buffer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexrayHeader {
    /// Payload preamble indicator.
    pub pp_indicator: bool,
    /// Null frame indicator: true when the payload is valid data.
    pub nf_indicator: bool,
    /// Slot id, 1–2047.
    pub frame_id: u16,
    /// Payload length in 16-bit words, rounded up.
    pub payload_length: u8,
    pub header_crc: u16,
    /// Cycle counter 0–63.
    pub cycle_count: u8,
}

/// A FlexRay frame at the semantic-field level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexrayFrame {
    pub header: FlexrayHeader,
    pub payload: Vec<u8>,
}

/// Full controller configuration handed to `configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexrayControllerConfig {
    pub cluster_params: FlexrayClusterParameters,
    pub node_params: FlexrayNodeParameters,
    pub buffer_configs: Vec<FlexrayTxBufferConfig>,
}

impl FlexrayControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster_params.validate()?;
        self.node_params.validate()?;
        for cfg in &self.buffer_configs {
            cfg.validate()?;
        }
        Ok(())
    }
}

/// Host commands forwarded to a detailed-mode simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexrayHostCommand {
    Run,
    DeferredHalt,
    Freeze,
    AllowColdstart,
    AllSlots,
    Wakeup,
}

#[cfg(test)]
#[path = "flexray_tests.rs"]
mod tests;
