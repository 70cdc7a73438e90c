use super::*;

fn status(name: &str, state: ParticipantState) -> ParticipantStatus {
    let mut status = ParticipantStatus::new(name);
    status.state = state;
    status
}

fn monitor_with_required(names: &[&str]) -> Arc<SystemMonitor> {
    let monitor = SystemMonitor::new();
    monitor.set_required(&names.iter().map(|n| n.to_string()).collect::<Vec<_>>());
    monitor
}

#[test]
fn no_workflow_configuration_means_invalid() {
    let monitor = SystemMonitor::new();
    monitor.on_status(&status("A", ParticipantState::Running));
    assert_eq!(monitor.system_state(), SystemState::Invalid);
}

#[test]
fn aggregation_over_required_only() {
    let monitor = monitor_with_required(&["A", "B"]);
    monitor.on_status(&status("A", ParticipantState::Running));
    monitor.on_status(&status("B", ParticipantState::ReadyToRun));
    // Not required; must not affect the aggregate.
    monitor.on_status(&status("C", ParticipantState::Error));

    assert_eq!(monitor.system_state(), SystemState::ReadyToRun);
}

#[test]
fn missing_required_participant_counts_as_invalid() {
    let monitor = monitor_with_required(&["A", "B"]);
    monitor.on_status(&status("A", ParticipantState::Running));
    assert_eq!(monitor.system_state(), SystemState::Invalid);
}

#[test]
fn illegal_transition_is_counted_but_accepted() {
    let monitor = monitor_with_required(&["A"]);
    monitor.on_status(&status("A", ParticipantState::ServicesCreated));
    monitor.on_status(&status("A", ParticipantState::Running));

    assert_eq!(monitor.invalid_transition_count(), 1);
    assert_eq!(monitor.system_state(), SystemState::Running);
}

#[test]
fn state_handler_fires_on_changes_with_initial_replay() {
    let monitor = monitor_with_required(&["A"]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        monitor.add_system_state_handler(move |state| {
            seen.lock().push(*state);
        });
    }

    monitor.on_status(&status("A", ParticipantState::ServicesCreated));
    monitor.on_status(&status("A", ParticipantState::CommunicationInitializing));

    let seen = seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            SystemState::Invalid,
            SystemState::ServicesCreated,
            SystemState::CommunicationInitializing
        ]
    );
}

#[test]
fn status_handler_replays_known_statuses() {
    let monitor = monitor_with_required(&["A", "B"]);
    monitor.on_status(&status("A", ParticipantState::Running));
    monitor.on_status(&status("B", ParticipantState::Running));

    let seen = Arc::new(Mutex::new(0usize));
    {
        let seen = Arc::clone(&seen);
        monitor.add_participant_status_handler(move |_| {
            *seen.lock() += 1;
        });
    }
    assert_eq!(*seen.lock(), 2);
}

#[test]
fn required_ready_needs_everyone_initialized() {
    let monitor = monitor_with_required(&["A", "B"]);
    assert!(!monitor.required_ready());

    monitor.on_status(&status("A", ParticipantState::CommunicationInitialized));
    assert!(!monitor.required_ready());

    monitor.on_status(&status("B", ParticipantState::ReadyToRun));
    assert!(monitor.required_ready());
}

#[test]
fn losing_a_required_participant_is_a_system_error() {
    let monitor = monitor_with_required(&["A", "B"]);
    monitor.on_status(&status("A", ParticipantState::Running));
    monitor.on_status(&status("B", ParticipantState::Running));

    monitor.on_peer_gone("B");
    assert_eq!(monitor.system_state(), SystemState::Error);
}

#[test]
fn losing_a_peer_during_teardown_is_expected() {
    let monitor = monitor_with_required(&["A", "B"]);
    monitor.on_status(&status("A", ParticipantState::Shutdown));
    monitor.on_status(&status("B", ParticipantState::Shutdown));

    monitor.on_peer_gone("B");
    assert_ne!(monitor.system_state(), SystemState::Error);
}

#[test]
fn losing_an_optional_peer_is_harmless() {
    let monitor = monitor_with_required(&["A"]);
    monitor.on_status(&status("A", ParticipantState::Running));
    monitor.on_status(&status("C", ParticipantState::Running));

    monitor.on_peer_gone("C");
    assert_eq!(monitor.system_state(), SystemState::Running);
}
