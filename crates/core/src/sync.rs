//! Participant lifecycle state machine and federation-wide state
//! aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single participant.
///
/// `Shutdown` is terminal; `Error` is recoverable only via Shutdown or
/// Abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    Invalid,
    ServicesCreated,
    CommunicationInitializing,
    CommunicationInitialized,
    ReadyToRun,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
    ShuttingDown,
    Shutdown,
    Aborting,
}

crate::simple_display! {
    ParticipantState {
        Invalid => "invalid",
        ServicesCreated => "services_created",
        CommunicationInitializing => "communication_initializing",
        CommunicationInitialized => "communication_initialized",
        ReadyToRun => "ready_to_run",
        Running => "running",
        Paused => "paused",
        Stopping => "stopping",
        Stopped => "stopped",
        Error => "error",
        ShuttingDown => "shutting_down",
        Shutdown => "shutdown",
        Aborting => "aborting",
    }
}

impl ParticipantState {
    /// Position of this state in the lifecycle's total order, used for the
    /// min-aggregation of [`SystemState`].
    pub fn rank(self) -> u8 {
        match self {
            ParticipantState::Invalid => 0,
            ParticipantState::ServicesCreated => 1,
            ParticipantState::CommunicationInitializing => 2,
            ParticipantState::CommunicationInitialized => 3,
            ParticipantState::ReadyToRun => 4,
            ParticipantState::Running => 5,
            ParticipantState::Paused => 6,
            ParticipantState::Stopping => 7,
            ParticipantState::Stopped => 8,
            ParticipantState::ShuttingDown => 9,
            ParticipantState::Shutdown => 10,
            // Overrides; rank only used to order the regular progression.
            ParticipantState::Error => 11,
            ParticipantState::Aborting => 12,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ParticipantState::Shutdown)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: ParticipantState) -> bool {
        use ParticipantState::*;

        // Abort is reachable from every state; Aborting only resolves to
        // Shutdown. Error is reachable from any non-terminal state.
        if next == Aborting {
            return self != Shutdown;
        }
        if next == Error {
            return !matches!(self, Shutdown | Aborting);
        }

        matches!(
            (self, next),
            (Invalid, ServicesCreated)
                | (ServicesCreated, CommunicationInitializing)
                | (CommunicationInitializing, CommunicationInitialized)
                | (CommunicationInitialized, ReadyToRun)
                | (ReadyToRun, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Stopped, ShuttingDown)
                | (Error, ShuttingDown)
                | (ShuttingDown, Shutdown)
                | (Aborting, Shutdown)
        )
    }
}

/// Published on every state change of a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub participant_name: String,
    pub state: ParticipantState,
    /// Human-readable reason for entering the state.
    pub enter_reason: String,
    pub enter_time: DateTime<Utc>,
    pub refresh_time: DateTime<Utc>,
}

impl ParticipantStatus {
    pub fn new(participant_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            participant_name: participant_name.into(),
            state: ParticipantState::Invalid,
            enter_reason: String::new(),
            enter_time: now,
            refresh_time: now,
        }
    }
}

/// Commands the system controller fans out to all participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemCommandKind {
    Run,
    Stop,
    Shutdown,
    AbortSimulation,
}

crate::simple_display! {
    SystemCommandKind {
        Run => "run",
        Stop => "stop",
        Shutdown => "shutdown",
        AbortSimulation => "abort_simulation",
    }
}

/// Aggregated state over the required participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Invalid,
    ServicesCreated,
    CommunicationInitializing,
    CommunicationInitialized,
    ReadyToRun,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
    ShuttingDown,
    Shutdown,
    Aborting,
}

crate::simple_display! {
    SystemState {
        Invalid => "invalid",
        ServicesCreated => "services_created",
        CommunicationInitializing => "communication_initializing",
        CommunicationInitialized => "communication_initialized",
        ReadyToRun => "ready_to_run",
        Running => "running",
        Paused => "paused",
        Stopping => "stopping",
        Stopped => "stopped",
        Error => "error",
        ShuttingDown => "shutting_down",
        Shutdown => "shutdown",
        Aborting => "aborting",
    }
}

impl From<ParticipantState> for SystemState {
    fn from(state: ParticipantState) -> Self {
        match state {
            ParticipantState::Invalid => SystemState::Invalid,
            ParticipantState::ServicesCreated => SystemState::ServicesCreated,
            ParticipantState::CommunicationInitializing => SystemState::CommunicationInitializing,
            ParticipantState::CommunicationInitialized => SystemState::CommunicationInitialized,
            ParticipantState::ReadyToRun => SystemState::ReadyToRun,
            ParticipantState::Running => SystemState::Running,
            ParticipantState::Paused => SystemState::Paused,
            ParticipantState::Stopping => SystemState::Stopping,
            ParticipantState::Stopped => SystemState::Stopped,
            ParticipantState::Error => SystemState::Error,
            ParticipantState::ShuttingDown => SystemState::ShuttingDown,
            ParticipantState::Shutdown => SystemState::Shutdown,
            ParticipantState::Aborting => SystemState::Aborting,
        }
    }
}

/// Compute the aggregated system state over the required participants.
///
/// Rules: any participant in `Aborting` wins; otherwise any `Error` wins;
/// otherwise any `Paused` wins; otherwise the minimum state under the
/// lifecycle's total order. An empty iterator yields `Invalid` (no workflow
/// configuration received yet).
pub fn aggregate_system_state<'a, I>(states: I) -> SystemState
where
    I: IntoIterator<Item = &'a ParticipantState>,
{
    let mut min: Option<ParticipantState> = None;
    let mut any_paused = false;
    let mut any_error = false;
    for state in states {
        match state {
            ParticipantState::Aborting => return SystemState::Aborting,
            ParticipantState::Error => any_error = true,
            ParticipantState::Paused => any_paused = true,
            other => match min {
                Some(m) if m.rank() <= other.rank() => {}
                _ => min = Some(*other),
            },
        }
    }
    if any_error {
        return SystemState::Error;
    }
    if any_paused {
        return SystemState::Paused;
    }
    match min {
        Some(state) => state.into(),
        None => SystemState::Invalid,
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
