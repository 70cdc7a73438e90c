//! The per-participant lifecycle state machine.
//!
//! `start` brings the participant through ServicesCreated and the
//! communication-ready handler; the transition to ReadyToRun happens once
//! every required participant has initialized, and Running is entered on
//! the system controller's Run command. The simulation task executes on the
//! participant's dispatcher under the time-quantum grant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch, Notify};
use tracing::{debug, warn};

use vib_core::{
    duration_to_nanos, NextSimTask, ParticipantState, ParticipantStatus, ServiceDescriptor,
    ServiceType, StateError, SystemCommandKind,
};
use vib_wire::Message;

use crate::bus::{BusHandle, DispatchItem};
use crate::orchestration::{SystemMonitor, Watchdog};
use crate::timesync::TimeSync;

type LifecycleHandler = Box<dyn FnMut() -> Result<(), String> + Send>;
type SimTask = Box<dyn FnMut(i64, i64) + Send>;

pub(crate) struct LifecycleCore {
    bus: BusHandle,
    descriptor: ServiceDescriptor,
    monitor: Arc<SystemMonitor>,
    time_sync: Arc<TimeSync>,
    watchdog: Watchdog,
    self_weak: Weak<LifecycleCore>,

    status: Mutex<ParticipantStatus>,
    started: AtomicBool,
    final_tx: Mutex<Option<oneshot::Sender<ParticipantState>>>,

    comm_ready_handler: Mutex<Option<LifecycleHandler>>,
    stop_handler: Mutex<Option<LifecycleHandler>>,
    shutdown_handler: Mutex<Option<LifecycleHandler>>,
    sim_task: Mutex<Option<SimTask>>,

    async_mode: AtomicBool,
    waiting_completion: AtomicBool,
    completion: Notify,

    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
}

impl LifecycleCore {
    pub fn new(
        bus: BusHandle,
        monitor: Arc<SystemMonitor>,
        time_sync: Arc<TimeSync>,
        watchdog: Watchdog,
    ) -> Arc<Self> {
        let descriptor = ServiceDescriptor::new(
            bus.participant_name.as_ref(),
            "LifecycleService",
            "default",
            ServiceType::InternalController,
            bus.next_service_id(),
        );
        let (pause_tx, pause_rx) = watch::channel(false);
        Arc::new_cyclic(|self_weak| Self {
            status: Mutex::new(ParticipantStatus::new(bus.participant_name.as_ref())),
            bus,
            descriptor,
            monitor,
            time_sync,
            watchdog,
            self_weak: self_weak.clone(),
            started: AtomicBool::new(false),
            final_tx: Mutex::new(None),
            comm_ready_handler: Mutex::new(None),
            stop_handler: Mutex::new(None),
            shutdown_handler: Mutex::new(None),
            sim_task: Mutex::new(None),
            async_mode: AtomicBool::new(false),
            waiting_completion: AtomicBool::new(false),
            completion: Notify::new(),
            pause_tx,
            pause_rx,
        })
    }

    pub fn state(&self) -> ParticipantState {
        self.status.lock().state
    }

    pub fn status(&self) -> ParticipantStatus {
        self.status.lock().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Transition and broadcast the new status.
    fn change_state(&self, new_state: ParticipantState, reason: impl Into<String>) {
        let status = {
            let mut status = self.status.lock();
            status.state = new_state;
            status.enter_reason = reason.into();
            status.enter_time = Utc::now();
            status.refresh_time = status.enter_time;
            status.clone()
        };
        self.bus.send(&self.descriptor, Message::ParticipantStatus(status));

        if new_state == ParticipantState::Shutdown {
            if let Some(tx) = self.final_tx.lock().take() {
                let _ = tx.send(new_state);
            }
        }
    }

    /// Re-broadcast the current status with a fresh refresh time.
    pub fn refresh_status(&self) {
        let status = {
            let mut status = self.status.lock();
            status.refresh_time = Utc::now();
            status.clone()
        };
        self.bus.send(&self.descriptor, Message::ParticipantStatus(status));
    }

    pub fn report_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "participant error");
        match self.state() {
            ParticipantState::Shutdown => {
                warn!("error reported in terminal state shutdown; transition ignored");
            }
            ParticipantState::Aborting => {
                warn!("error reported while aborting; transition ignored");
            }
            _ => self.change_state(ParticipantState::Error, reason),
        }
    }

    fn invoke_handler(slot: &Mutex<Option<LifecycleHandler>>) -> Result<(), String> {
        let taken = slot.lock().take();
        let Some(mut handler) = taken else {
            return Ok(());
        };
        let result = handler();
        let mut lock = slot.lock();
        if lock.is_none() {
            *lock = Some(handler);
        }
        result
    }

    // -- dispatcher entry points --

    /// The StartLifecycle dispatch item. The participant has announced the
    /// time-sync service (if any) before this runs, so peers know about it
    /// ahead of CommunicationInitialized.
    pub async fn handle_start(&self) {
        self.change_state(ParticipantState::ServicesCreated, "lifecycle started");
        self.change_state(
            ParticipantState::CommunicationInitializing,
            "starting communication ready handler",
        );
        if let Err(e) = Self::invoke_handler(&self.comm_ready_handler) {
            self.report_error(format!("communication ready handler failed: {e}"));
            return;
        }
        self.change_state(
            ParticipantState::CommunicationInitialized,
            "communication ready handler completed",
        );
        self.maybe_ready_to_run();
    }

    /// ReadyToRun requires every required participant to have initialized.
    pub fn maybe_ready_to_run(&self) {
        if self.state() != ParticipantState::CommunicationInitialized {
            return;
        }
        if self.monitor.required_ready() {
            self.change_state(
                ParticipantState::ReadyToRun,
                "all required participants initialized",
            );
        }
    }

    pub fn on_system_command(&self, kind: SystemCommandKind) {
        if !self.is_started() {
            debug!(%kind, "system command before lifecycle start; ignored");
            return;
        }
        let state = self.state();
        match kind {
            SystemCommandKind::Run => match state {
                ParticipantState::ReadyToRun => {
                    self.change_state(ParticipantState::Running, "received system command run");
                    self.time_sync.request_initial_step();
                    self.bus.enqueue(DispatchItem::TimeGrantCheck);
                }
                ParticipantState::Running | ParticipantState::Paused => {
                    debug!("system command run ignored; already running");
                }
                _ => self.report_error(format!("received system command run in state {state}")),
            },
            SystemCommandKind::Stop => match state {
                ParticipantState::Stopped | ParticipantState::Stopping => {
                    warn!("system command stop ignored; already stopping");
                }
                ParticipantState::Running => {
                    self.do_stop("received system command stop");
                }
                _ => self.report_error(format!("received system command stop in state {state}")),
            },
            SystemCommandKind::Shutdown => match state {
                ParticipantState::Error | ParticipantState::Stopped => {
                    self.do_shutdown("received system command shutdown");
                }
                ParticipantState::ShuttingDown | ParticipantState::Shutdown => {}
                _ => self
                    .report_error(format!("received system command shutdown in state {state}")),
            },
            SystemCommandKind::AbortSimulation => self.do_abort(),
        }
    }

    fn do_stop(&self, reason: &str) {
        self.change_state(ParticipantState::Stopping, reason);
        match Self::invoke_handler(&self.stop_handler) {
            Ok(()) => self.change_state(
                ParticipantState::Stopped,
                format!("{reason} and stop handler completed"),
            ),
            Err(e) => self.report_error(format!("stop handler failed: {e}")),
        }
    }

    fn do_shutdown(&self, reason: &str) {
        self.change_state(ParticipantState::ShuttingDown, reason);
        // A failing shutdown handler must not wedge the teardown; note it
        // in the reason and finish.
        let reason = match Self::invoke_handler(&self.shutdown_handler) {
            Ok(()) => format!("{reason} and shutdown handler completed"),
            Err(e) => {
                warn!(error = %e, "shutdown handler failed");
                format!("{reason} and shutdown handler failed: {e}")
            }
        };
        self.change_state(ParticipantState::Shutdown, reason);
    }

    fn do_abort(&self) {
        let state = self.state();
        if state == ParticipantState::Shutdown {
            debug!("abort ignored in terminal state");
            return;
        }
        // Abort bypasses the stop and shutdown handlers.
        self.change_state(ParticipantState::Aborting, "received system command abort");
        self.change_state(ParticipantState::Shutdown, format!("aborted from state {state}"));
    }

    /// Execute one granted simulation step on the dispatcher.
    pub async fn execute_sim_task(&self, task: NextSimTask) {
        let Some(mut sim_task) = self.sim_task.lock().take() else {
            return;
        };
        self.bus.time_provider.set_virtual(task.time_point);

        let async_mode = self.async_mode.load(Ordering::Acquire);
        if async_mode {
            self.waiting_completion.store(true, Ordering::Release);
        }

        let watchdog_guard = self.start_watchdog();
        sim_task(task.time_point, task.duration);
        drop(watchdog_guard);

        {
            let mut slot = self.sim_task.lock();
            if slot.is_none() {
                *slot = Some(sim_task);
            }
        }

        if async_mode {
            while self.waiting_completion.load(Ordering::Acquire) {
                self.completion.notified().await;
            }
        }

        // The step that was already granted finishes even when pausing;
        // the next grant waits here until continue.
        let mut paused = self.pause_rx.clone();
        loop {
            if !*paused.borrow_and_update() {
                break;
            }
            if paused.changed().await.is_err() {
                break;
            }
        }
    }

    fn start_watchdog(&self) -> Option<crate::orchestration::watchdog::WatchdogGuard> {
        let weak = self.self_weak.clone();
        self.watchdog.start(
            |timeout| {
                warn!(?timeout, "simulation task did not finish within the soft time limit");
            },
            move |timeout| {
                if let Some(core) = weak.upgrade() {
                    core.report_error(format!(
                        "simulation task did not finish within the hard time limit of {timeout:?}"
                    ));
                }
            },
        )
    }

    // -- user API backing --

    pub fn set_communication_ready_handler(&self, handler: LifecycleHandler) {
        *self.comm_ready_handler.lock() = Some(handler);
    }

    pub fn set_stop_handler(&self, handler: LifecycleHandler) {
        *self.stop_handler.lock() = Some(handler);
    }

    pub fn set_shutdown_handler(&self, handler: LifecycleHandler) {
        *self.shutdown_handler.lock() = Some(handler);
    }

    pub fn set_simulation_task(&self, task: SimTask, async_mode: bool) {
        *self.sim_task.lock() = Some(task);
        self.async_mode.store(async_mode, Ordering::Release);
        self.time_sync.ensure_enabled();
    }

    pub fn complete_simulation_task(&self) -> Result<(), StateError> {
        if !self.waiting_completion.swap(false, Ordering::AcqRel) {
            return Err(StateError::new("no simulation task awaiting completion"));
        }
        self.completion.notify_one();
        Ok(())
    }

    pub fn pause(&self, reason: impl Into<String>) -> Result<(), StateError> {
        if self.state() != ParticipantState::Running {
            return Err(StateError::new(format!(
                "pause requires the running state (currently {})",
                self.state()
            )));
        }
        self.change_state(ParticipantState::Paused, reason);
        let _ = self.pause_tx.send(true);
        Ok(())
    }

    pub fn continue_simulation(&self) -> Result<(), StateError> {
        if self.state() != ParticipantState::Paused {
            return Err(StateError::new(format!(
                "continue requires the paused state (currently {})",
                self.state()
            )));
        }
        self.change_state(ParticipantState::Running, "pause finished");
        let _ = self.pause_tx.send(false);
        Ok(())
    }

    pub fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub fn set_final_tx(&self, tx: oneshot::Sender<ParticipantState>) {
        *self.final_tx.lock() = Some(tx);
    }
}

/// User handle of the lifecycle service.
#[derive(Clone)]
pub struct LifecycleService {
    core: Arc<LifecycleCore>,
}

impl LifecycleService {
    pub(crate) fn new(core: Arc<LifecycleCore>) -> Self {
        Self { core }
    }

    pub fn state(&self) -> ParticipantState {
        self.core.state()
    }

    pub fn status(&self) -> ParticipantStatus {
        self.core.status()
    }

    /// Invoked between ServicesCreated and CommunicationInitialized; an
    /// `Err` drives the participant into the Error state.
    pub fn set_communication_ready_handler(
        &self,
        handler: impl FnMut() -> Result<(), String> + Send + 'static,
    ) {
        self.core.set_communication_ready_handler(Box::new(handler));
    }

    pub fn set_stop_handler(&self, handler: impl FnMut() -> Result<(), String> + Send + 'static) {
        self.core.set_stop_handler(Box::new(handler));
    }

    pub fn set_shutdown_handler(
        &self,
        handler: impl FnMut() -> Result<(), String> + Send + 'static,
    ) {
        self.core.set_shutdown_handler(Box::new(handler));
    }

    /// Blocking-mode simulation task: the grant is released when the task
    /// returns. Setting a task makes this participant synchronized.
    pub fn set_simulation_task(&self, task: impl FnMut(i64, i64) + Send + 'static) {
        self.core.set_simulation_task(Box::new(task), false);
    }

    /// Async-mode simulation task: the grant is held until
    /// [`LifecycleService::complete_simulation_task`].
    pub fn set_simulation_task_async(&self, task: impl FnMut(i64, i64) + Send + 'static) {
        self.core.set_simulation_task(Box::new(task), true);
    }

    /// Release the grant of an async simulation task.
    pub fn complete_simulation_task(&self) -> Result<(), StateError> {
        self.core.complete_simulation_task()
    }

    /// Virtual-time step of this participant; peers may use different
    /// periods.
    pub fn set_period(&self, period: Duration) {
        self.core.time_sync.set_period(duration_to_nanos(period));
    }

    pub fn pause(&self, reason: impl Into<String>) -> Result<(), StateError> {
        self.core.pause(reason)
    }

    pub fn continue_simulation(&self) -> Result<(), StateError> {
        self.core.continue_simulation()
    }

    /// Drive this participant into the Error state.
    pub fn report_error(&self, reason: impl Into<String>) {
        self.core.report_error(reason);
    }

    /// Re-broadcast the current status with a fresh refresh time.
    pub fn refresh_status(&self) {
        self.core.refresh_status();
    }

    /// Start the lifecycle; resolves with the final state once the
    /// participant reaches Shutdown.
    pub async fn start(&self) -> Result<ParticipantState, StateError> {
        if !self.core.mark_started() {
            return Err(StateError::new("lifecycle already started"));
        }
        let (tx, rx) = oneshot::channel();
        self.core.set_final_tx(tx);
        self.core.bus.enqueue(DispatchItem::StartLifecycle);
        rx.await.map_err(|_| StateError::new("participant dropped before shutdown"))
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
