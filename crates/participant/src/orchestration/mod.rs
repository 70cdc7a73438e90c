//! Orchestration: the participant lifecycle, the federation-wide monitor
//! and the system controller.

mod controller;
mod lifecycle;
mod monitor;
pub(crate) mod watchdog;

pub use controller::SystemController;
pub use lifecycle::LifecycleService;
pub use monitor::SystemMonitor;

pub(crate) use controller::SystemControllerCore;
pub(crate) use lifecycle::LifecycleCore;
pub(crate) use watchdog::Watchdog;
