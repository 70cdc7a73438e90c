//! The system monitor: tracks every participant's status, validates the
//! observed transitions, and aggregates the federation-wide system state
//! over the required participants.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vib_core::{
    aggregate_system_state, HandlerIdSource, HandlerRegistry, ParticipantState, ParticipantStatus,
    SystemState,
};

struct MonitorState {
    statuses: HashMap<String, ParticipantStatus>,
    required: Option<Vec<String>>,
    system_state: SystemState,
    /// A required participant's connection was lost.
    lost_required: bool,
    invalid_transitions: u64,
}

/// Observes the federation. One per participant; also usable standalone.
pub struct SystemMonitor {
    state: Mutex<MonitorState>,
    state_handlers: HandlerRegistry<SystemState>,
    status_handlers: HandlerRegistry<ParticipantStatus>,
}

impl SystemMonitor {
    pub(crate) fn new() -> Arc<Self> {
        let ids = HandlerIdSource::new();
        Arc::new(Self {
            state: Mutex::new(MonitorState {
                statuses: HashMap::new(),
                required: None,
                system_state: SystemState::Invalid,
                lost_required: false,
                invalid_transitions: 0,
            }),
            state_handlers: HandlerRegistry::new(Arc::clone(&ids)),
            status_handlers: HandlerRegistry::new(ids),
        })
    }

    /// Current aggregated state over the required participants.
    pub fn system_state(&self) -> SystemState {
        self.state.lock().system_state
    }

    /// Last known status of one participant.
    pub fn participant_status(&self, name: &str) -> Option<ParticipantStatus> {
        self.state.lock().statuses.get(name).cloned()
    }

    /// Count of observed transitions the lifecycle graph does not permit.
    pub fn invalid_transition_count(&self) -> u64 {
        self.state.lock().invalid_transitions
    }

    /// Register for system-state changes; called immediately with the
    /// current state.
    pub fn add_system_state_handler(
        &self,
        handler: impl Fn(&SystemState) + Send + Sync + 'static,
    ) -> vib_core::HandlerId {
        let current = self.system_state();
        handler(&current);
        self.state_handlers.add(handler)
    }

    pub fn remove_system_state_handler(&self, id: vib_core::HandlerId) {
        if !self.state_handlers.remove(id) {
            warn!(%id, "remove_system_state_handler: unknown handler id");
        }
    }

    /// Register for participant status updates; known statuses are replayed
    /// immediately.
    pub fn add_participant_status_handler(
        &self,
        handler: impl Fn(&ParticipantStatus) + Send + Sync + 'static,
    ) -> vib_core::HandlerId {
        let replay: Vec<_> = self.state.lock().statuses.values().cloned().collect();
        for status in &replay {
            handler(status);
        }
        self.status_handlers.add(handler)
    }

    pub fn remove_participant_status_handler(&self, id: vib_core::HandlerId) {
        if !self.status_handlers.remove(id) {
            warn!(%id, "remove_participant_status_handler: unknown handler id");
        }
    }

    /// Every required participant has at least initialized communication.
    pub(crate) fn required_ready(&self) -> bool {
        let state = self.state.lock();
        let Some(required) = state.required.as_ref() else {
            return false;
        };
        !required.is_empty()
            && required.iter().all(|name| {
                state
                    .statuses
                    .get(name)
                    .map(|s| {
                        s.state.rank() >= ParticipantState::CommunicationInitialized.rank()
                            && !matches!(
                                s.state,
                                ParticipantState::Error | ParticipantState::Aborting
                            )
                    })
                    .unwrap_or(false)
            })
    }

    // -- inbound, dispatcher only --

    pub(crate) fn on_status(&self, status: &ParticipantStatus) {
        {
            let mut state = self.state.lock();
            if let Some(previous) = state.statuses.get(&status.participant_name) {
                if previous.state != status.state
                    && !previous.state.can_transition_to(status.state)
                {
                    warn!(
                        participant = %status.participant_name,
                        from = %previous.state,
                        to = %status.state,
                        "illegal lifecycle transition observed"
                    );
                    state.invalid_transitions += 1;
                }
            }
            state.statuses.insert(status.participant_name.clone(), status.clone());
        }
        self.status_handlers.dispatch(status);
        self.recompute();
    }

    pub(crate) fn set_required(&self, names: &[String]) {
        debug!(?names, "workflow configuration");
        self.state.lock().required = Some(names.to_vec());
        self.recompute();
    }

    pub(crate) fn required(&self) -> Option<Vec<String>> {
        self.state.lock().required.clone()
    }

    pub(crate) fn on_peer_gone(&self, participant_name: &str) {
        {
            let mut state = self.state.lock();
            let required = state
                .required
                .as_ref()
                .map(|r| r.iter().any(|n| n == participant_name))
                .unwrap_or(false);
            if !required {
                state.statuses.remove(participant_name);
                return;
            }
            // Losing a required participant is a system-level failure,
            // unless the federation is already winding down.
            if is_teardown_state(state.system_state) {
                state.statuses.remove(participant_name);
            } else {
                warn!(participant = %participant_name, "required participant lost");
                state.lost_required = true;
            }
        }
        self.recompute();
    }

    fn recompute(&self) {
        let (changed, new_state) = {
            let mut state = self.state.lock();
            let new_state = if state.lost_required {
                SystemState::Error
            } else {
                match state.required.as_ref() {
                    None => SystemState::Invalid,
                    Some(required) if required.is_empty() => SystemState::Invalid,
                    Some(required) => {
                        let states: Vec<ParticipantState> = required
                            .iter()
                            .map(|name| {
                                state
                                    .statuses
                                    .get(name)
                                    .map(|s| s.state)
                                    .unwrap_or(ParticipantState::Invalid)
                            })
                            .collect();
                        aggregate_system_state(states.iter())
                    }
                }
            };
            let changed = new_state != state.system_state;
            state.system_state = new_state;
            (changed, new_state)
        };
        if changed {
            debug!(state = %new_state, "system state");
            self.state_handlers.dispatch(&new_state);
        }
    }
}

/// During an orderly teardown a disappearing peer is expected.
fn is_teardown_state(state: SystemState) -> bool {
    matches!(
        state,
        SystemState::Stopping
            | SystemState::Stopped
            | SystemState::ShuttingDown
            | SystemState::Shutdown
            | SystemState::Aborting
    )
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
