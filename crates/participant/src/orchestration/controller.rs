//! The system controller: exactly one participant publishes system
//! commands and the workflow configuration naming the required
//! participants.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use vib_core::{ServiceDescriptor, ServiceType, SystemCommandKind};
use vib_wire::Message;

use crate::bus::BusHandle;

pub(crate) struct SystemControllerCore {
    bus: BusHandle,
    descriptor: ServiceDescriptor,
    workflow: Mutex<Option<Vec<String>>>,
}

impl SystemControllerCore {
    pub fn new(bus: BusHandle) -> Arc<Self> {
        let descriptor = ServiceDescriptor::new(
            bus.participant_name.as_ref(),
            "SystemController",
            "default",
            ServiceType::InternalController,
            bus.next_service_id(),
        );
        Arc::new(Self { bus, descriptor, workflow: Mutex::new(None) })
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    fn send_command(&self, kind: SystemCommandKind) {
        debug!(%kind, "system command");
        self.bus.send(&self.descriptor, Message::SystemCommand { kind });
    }

    pub fn set_workflow_configuration(&self, required_participant_names: Vec<String>) {
        *self.workflow.lock() = Some(required_participant_names.clone());
        self.bus.send(
            &self.descriptor,
            Message::WorkflowConfiguration { required_participant_names },
        );
    }

    /// Late joiners receive the workflow configuration again when they
    /// announce themselves.
    pub fn republish_workflow(&self) {
        let workflow = self.workflow.lock().clone();
        if let Some(required_participant_names) = workflow {
            self.bus.send(
                &self.descriptor,
                Message::WorkflowConfiguration { required_participant_names },
            );
        }
    }
}

/// User handle of the system controller.
#[derive(Clone)]
pub struct SystemController {
    core: Arc<SystemControllerCore>,
}

impl SystemController {
    pub(crate) fn new(core: Arc<SystemControllerCore>) -> Self {
        Self { core }
    }

    /// Declare the required participants counted into the system state.
    pub fn set_workflow_configuration(&self, required_participant_names: Vec<String>) {
        self.core.set_workflow_configuration(required_participant_names);
    }

    /// Start the simulation once the system is ReadyToRun.
    pub fn run(&self) {
        self.core.send_command(SystemCommandKind::Run);
    }

    /// Stop the running simulation.
    pub fn stop(&self) {
        self.core.send_command(SystemCommandKind::Stop);
    }

    /// Shut the stopped (or errored) federation down.
    pub fn shutdown(&self) {
        self.core.send_command(SystemCommandKind::Shutdown);
    }

    /// Abort: every participant goes to Shutdown, bypassing the stop and
    /// shutdown handlers.
    pub fn abort_simulation(&self) {
        self.core.send_command(SystemCommandKind::AbortSimulation);
    }
}
