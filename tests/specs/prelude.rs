//! Shared helpers for the end-to-end scenarios.

use std::time::Duration;

use vib_core::{ParticipantConfig, SystemState};
use vib_participant::Participant;
use vib_registry::Registry;

pub async fn registry() -> Registry {
    Registry::bind("127.0.0.1:0").await.expect("bind registry")
}

pub async fn participant(registry: &Registry, name: &str) -> Participant {
    Participant::connect(ParticipantConfig::default(), name, registry.local_addr())
        .await
        .expect("connect participant")
}

/// Poll until `cond` holds; panics after 10 seconds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        if std::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wire a participant up as the system controller of `required`: it issues
/// Run when everyone is ready, Shutdown when everyone stopped, and it
/// reports the required set to the federation.
pub fn drive_system(controller_participant: &Participant, required: &[&str]) {
    let controller = controller_participant.system_controller();
    let monitor = controller_participant.system_monitor();

    controller.set_workflow_configuration(required.iter().map(|s| s.to_string()).collect());

    let commands = controller.clone();
    monitor.add_system_state_handler(move |state| match state {
        SystemState::ReadyToRun => commands.run(),
        SystemState::Stopped => commands.shutdown(),
        _ => {}
    });
}
