//! Background pressure monitor.

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, info_span};

use super::MemoryGovernor;

/// Handle to a running monitor task. Dropping it stops the monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Check if the task is finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the monitor.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MemoryGovernor {
    /// Spawns a task on the current tokio runtime that checks the zone every
    /// [`monitor_interval`](Self::monitor_interval) and relieves pressure
    /// when it finds any.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn_monitor(&self) -> MonitorHandle {
        let governor = self.clone();
        let period = self.monitor_interval();
        let span = info_span!("memory_monitor", period = ?period);
        let handle = tokio::spawn(
            async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Some(relief) = governor.relieve_pressure() {
                        debug!(
                            handlers = relief.handlers_invoked,
                            released = relief.released,
                            zone = ?governor.zone(),
                            "relieved memory pressure"
                        );
                    }
                }
            }
            .instrument(span),
        );
        MonitorHandle { handle }
    }
}
