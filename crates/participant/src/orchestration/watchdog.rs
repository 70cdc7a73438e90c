//! Wall-clock watchdog around the simulation task.
//!
//! The soft limit logs a warning; the hard limit reports an error and
//! drives the participant into the Error state. Resetting happens by
//! dropping the guard when the task returns.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use vib_core::HealthCheckConfig;

pub(crate) struct Watchdog {
    soft: Option<Duration>,
    hard: Option<Duration>,
}

/// Cancels the pending timeouts on drop.
pub(crate) struct WatchdogGuard {
    token: CancellationToken,
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Watchdog {
    pub fn new(config: &HealthCheckConfig) -> Self {
        Self { soft: config.soft_timeout(), hard: config.hard_timeout() }
    }

    /// Arm the watchdog. Returns `None` when no limits are configured.
    pub fn start(
        &self,
        on_soft: impl FnOnce(Duration) + Send + 'static,
        on_hard: impl FnOnce(Duration) + Send + 'static,
    ) -> Option<WatchdogGuard> {
        if self.soft.is_none() && self.hard.is_none() {
            return None;
        }
        let token = CancellationToken::new();
        let watched = token.clone();
        let soft = self.soft;
        let hard = self.hard;
        tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            if let Some(soft) = soft {
                tokio::select! {
                    _ = watched.cancelled() => return,
                    _ = tokio::time::sleep(soft) => on_soft(soft),
                }
                elapsed = soft;
            }
            if let Some(hard) = hard {
                let rest = hard.saturating_sub(elapsed);
                tokio::select! {
                    _ = watched.cancelled() => return,
                    _ = tokio::time::sleep(rest) => on_hard(hard),
                }
            }
        });
        Some(WatchdogGuard { token })
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
