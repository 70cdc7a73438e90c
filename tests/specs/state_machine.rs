//! The full lifecycle of one coordinated participant, driven by a system
//! controller: every state is entered exactly once, in order, with no
//! error.

use super::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vib_core::{ParticipantState, SystemState};

#[tokio::test(flavor = "multi_thread")]
async fn coordinated_lifecycle_walks_every_state_once() {
    let registry = registry().await;

    let test_controller = participant(&registry, "TestController").await;
    let controller = test_controller.system_controller();
    let monitor = test_controller.system_monitor();
    controller.set_workflow_configuration(vec!["TestUnit".to_string()]);

    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let observed = Arc::clone(&observed);
        monitor.add_participant_status_handler(move |status| {
            if status.participant_name == "TestUnit" {
                observed.lock().push(status.state);
            }
        });
    }
    {
        let commands = controller.clone();
        monitor.add_system_state_handler(move |state| match state {
            SystemState::ReadyToRun => commands.run(),
            SystemState::Stopped => commands.shutdown(),
            _ => {}
        });
    }

    let test_unit = participant(&registry, "TestUnit").await;
    let lifecycle = test_unit.lifecycle_service();
    let handler_calls = Arc::new(Mutex::new(Vec::new()));
    {
        let calls = Arc::clone(&handler_calls);
        lifecycle.set_communication_ready_handler(move || {
            calls.lock().push("communication_ready");
            Ok(())
        });
    }
    {
        let calls = Arc::clone(&handler_calls);
        lifecycle.set_stop_handler(move || {
            calls.lock().push("stop");
            Ok(())
        });
    }
    {
        let calls = Arc::clone(&handler_calls);
        lifecycle.set_shutdown_handler(move || {
            calls.lock().push("shutdown");
            Ok(())
        });
    }

    let run = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.start().await })
    };

    // Stop once the unit is running.
    wait_until("system running", || monitor.system_state() == SystemState::Running).await;
    controller.stop();

    let final_state = tokio::time::timeout(Duration::from_secs(30), run)
        .await
        .expect("scenario timed out")
        .expect("join")
        .expect("lifecycle");
    assert_eq!(final_state, ParticipantState::Shutdown);

    wait_until("terminal status observed", || {
        observed.lock().last() == Some(&ParticipantState::Shutdown)
    })
    .await;

    let expected = vec![
        ParticipantState::ServicesCreated,
        ParticipantState::CommunicationInitializing,
        ParticipantState::CommunicationInitialized,
        ParticipantState::ReadyToRun,
        ParticipantState::Running,
        ParticipantState::Stopping,
        ParticipantState::Stopped,
        ParticipantState::ShuttingDown,
        ParticipantState::Shutdown,
    ];
    assert_eq!(*observed.lock(), expected, "each state exactly once, no error");
    assert_eq!(
        *handler_calls.lock(),
        vec!["communication_ready", "stop", "shutdown"],
        "each lifecycle hook ran exactly once"
    );
    assert_eq!(monitor.invalid_transition_count(), 0);
}
