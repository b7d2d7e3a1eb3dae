//! Liveness monitor.
//!
//! Every interval the monitor pings each connection that answered since the
//! previous pass and terminates the ones that did not. A silent peer is
//! therefore gone after at most two intervals.

use crate::hub::Hub;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default sweep interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections pinged this pass.
    pub pinged: usize,
    /// Connections terminated for not answering the previous ping.
    pub terminated: usize,
}

/// Callback invoked after every sweep run by [`HeartbeatMonitor::run`].
pub type SweepObserver = Box<dyn Fn(&SweepReport) + Send + Sync>;

/// Periodic ping/terminate loop over every connection of a hub.
pub struct HeartbeatMonitor {
    hub: Arc<Hub>,
    interval: Duration,
    observer: Option<SweepObserver>,
}

impl HeartbeatMonitor {
    /// Create a monitor; it does nothing until run.
    #[must_use]
    pub fn new(hub: Arc<Hub>, interval: Duration) -> Self {
        Self {
            hub,
            interval,
            observer: None,
        }
    }

    /// Report every sweep to `observer`, e.g. to export metrics.
    #[must_use]
    pub fn with_observer(
        mut self,
        observer: impl Fn(&SweepReport) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The sweep interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass.
    pub fn sweep(&self) -> SweepReport {
        let (pinged, dead) = self.hub.rooms.probe();

        let mut terminated = 0;
        for connection_id in &dead {
            debug!(connection = %connection_id, "Terminating unresponsive connection");
            if self.hub.terminate(connection_id) {
                terminated += 1;
            }
        }

        SweepReport { pinged, terminated }
    }

    /// Sweep forever. The first pass happens one interval after start.
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.sweep();
            if let Some(observer) = &self.observer {
                observer(&report);
            }
            if report.terminated > 0 {
                info!(
                    pinged = report.pinged,
                    terminated = report.terminated,
                    "Heartbeat sweep"
                );
            } else {
                debug!(pinged = report.pinged, "Heartbeat sweep");
            }
        }
    }

    /// Run on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
