//! Distributed time-quantum synchronization.
//!
//! Every synchronized participant keeps its own next step and the last
//! published step of every synchronized peer. A participant may execute
//! its simulation task when no peer is strictly earlier. After executing it
//! advances, publishes, and re-checks via the deferred dispatcher queue so
//! a lone participant keeps advancing without starving other dispatch
//! items.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vib_core::service::supplemental;
use vib_core::{NextSimTask, ServiceDescriptor, ServiceType};
use vib_wire::Message;

use crate::bus::BusHandle;

/// Nanoseconds used when no period was configured.
const DEFAULT_PERIOD_NS: i64 = 1_000_000;

/// Publishes the current simulation time to every handler and controller of
/// one participant.
///
/// Before synchronization starts (or for unsynchronized participants) it
/// reports wall-clock nanoseconds since the process baseline, so messages
/// still carry monotone timestamps.
pub struct TimeProvider {
    /// Virtual now; i64::MIN while not yet under virtual time.
    virtual_now: AtomicI64,
    baseline: std::time::Instant,
}

impl TimeProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { virtual_now: AtomicI64::new(i64::MIN), baseline: std::time::Instant::now() })
    }

    /// Current simulation time in nanoseconds.
    ///
    /// Handlers invoked from the dispatcher observe the timestamp of the
    /// currently dispatched step.
    pub fn now(&self) -> i64 {
        let now = self.virtual_now.load(Ordering::Acquire);
        if now == i64::MIN {
            i64::try_from(self.baseline.elapsed().as_nanos()).unwrap_or(i64::MAX)
        } else {
            now
        }
    }

    /// True once virtual time has been granted at least once.
    pub fn is_synchronized(&self) -> bool {
        self.virtual_now.load(Ordering::Acquire) != i64::MIN
    }

    pub(crate) fn set_virtual(&self, now: i64) {
        self.virtual_now.store(now, Ordering::Release);
    }
}

struct TimeSyncState {
    enabled: bool,
    my_next: NextSimTask,
    others: HashMap<String, NextSimTask>,
}

/// The distributed time-quantum policy of one participant.
pub(crate) struct TimeSync {
    bus: BusHandle,
    descriptor: Mutex<Option<ServiceDescriptor>>,
    announced: AtomicBool,
    state: Mutex<TimeSyncState>,
}

impl TimeSync {
    pub fn new(bus: BusHandle) -> Arc<Self> {
        Arc::new(Self {
            bus,
            descriptor: Mutex::new(None),
            announced: AtomicBool::new(false),
            state: Mutex::new(TimeSyncState {
                enabled: false,
                my_next: NextSimTask::new(0, DEFAULT_PERIOD_NS),
                others: HashMap::new(),
            }),
        })
    }

    /// The internal service descriptor announced for a synchronized
    /// participant; peers discover each other through it.
    pub fn make_descriptor(bus: &BusHandle) -> ServiceDescriptor {
        ServiceDescriptor::new(
            bus.participant_name.as_ref(),
            "TimeSyncService",
            "default",
            ServiceType::InternalController,
            bus.next_service_id(),
        )
        .with_supplemental(supplemental::TIME_SYNC_ACTIVE, "1")
    }

    /// Mark this participant synchronized; the descriptor used for
    /// publishing NextSimTask messages is created on first call.
    pub fn ensure_enabled(&self) {
        {
            let mut descriptor = self.descriptor.lock();
            if descriptor.is_none() {
                *descriptor = Some(Self::make_descriptor(&self.bus));
            }
        }
        self.state.lock().enabled = true;
        // Synchronized participants observe virtual time from the start,
        // not the wall-clock fallback.
        self.bus.time_provider.set_virtual(0);
    }

    /// The descriptor to announce, exactly once.
    pub fn take_unannounced_descriptor(&self) -> Option<ServiceDescriptor> {
        if !self.is_enabled() || self.announced.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.descriptor.lock().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn set_period(&self, period_ns: i64) {
        self.state.lock().my_next.duration = period_ns.max(1);
    }

    /// A synchronized peer appeared (via discovery of its time-sync
    /// descriptor). Until its first NextSimTask arrives it blocks grants.
    pub fn peer_added(&self, peer: &str) {
        if peer == self.bus.participant_name.as_ref() {
            return;
        }
        let mut state = self.state.lock();
        if state.others.contains_key(peer) {
            // A published step must never be reset to the sentinel.
            warn!(peer, "synchronized participant already known");
            return;
        }
        state.others.insert(peer.to_string(), NextSimTask::UNPUBLISHED);
    }

    /// A synchronized peer left; its entry must not block grants anymore.
    pub fn peer_removed(&self, peer: &str) {
        let mut state = self.state.lock();
        if state.others.remove(peer).is_none() {
            debug!(peer, "removed synchronized participant was unknown");
        }
    }

    /// Record a peer's published step.
    pub fn on_next_sim_task(&self, from: &ServiceDescriptor, task: NextSimTask) {
        let mut state = self.state.lock();
        state.others.insert(from.participant_name.clone(), task);
    }

    /// Publish the first step after entering Running.
    pub fn request_initial_step(&self) {
        let state = self.state.lock();
        if !state.enabled {
            return;
        }
        self.publish(state.my_next);
    }

    /// Evaluate the grant condition; on success return the step to execute
    /// and advance the pending one.
    ///
    /// The caller executes the task, then calls [`TimeSync::publish_next`].
    pub fn try_grant(&self) -> Option<NextSimTask> {
        let mut state = self.state.lock();
        if !state.enabled {
            return None;
        }
        let my_next = state.my_next;
        for task in state.others.values() {
            if my_next.time_point > task.time_point {
                return None;
            }
        }
        // No peer is strictly earlier: our turn.
        state.my_next.time_point = my_next.time_point + my_next.duration;
        Some(my_next)
    }

    /// Publish the pending step to all peers.
    pub fn publish_next(&self) {
        let state = self.state.lock();
        self.publish(state.my_next);
    }

    fn publish(&self, task: NextSimTask) {
        let descriptor = self.descriptor.lock().clone();
        let Some(descriptor) = descriptor else {
            warn!("time sync enabled without a descriptor");
            return;
        };
        self.bus.send(&descriptor, Message::NextSimTask(task));
    }
}

#[cfg(test)]
#[path = "timesync_tests.rs"]
mod tests;
