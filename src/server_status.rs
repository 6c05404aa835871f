//! Best-effort model of backend reachability.
//!
//! One `ServerMonitor` exists per client session. The API client stamps it on
//! every request, the worker drives the startup/idle/wake sequences, and the
//! UI reads it through a watch channel. It never blocks a request from being
//! attempted; it only informs what the UI shows.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Believed backend state. A single 5xx or an idle timeout flips this to
/// `Offline` even though the server may merely be slow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerStatus {
    /// Health not yet established (also shown while waking).
    Starting,
    /// Last contact succeeded.
    Online,
    /// Believed asleep or unreachable.
    Offline,
}

impl ServerStatus {
    /// Badge text shown in the status bar.
    pub fn label(self) -> &'static str {
        match self {
            Self::Starting => "Waking Up...",
            Self::Online => "Server Online",
            Self::Offline => "Server Offline",
        }
    }
}

/// No API traffic for this long counts as idle (the hosted backend suspends
/// itself around the same mark).
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(15 * 60);
/// Cadence of the idle check.
pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// Cadence of health polling while waiting for the server to come up.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Health-check attempts for a manual wake request.
pub const WAKE_ATTEMPTS: u32 = 3;
/// Pause between failed wake attempts.
pub const WAKE_RETRY_PAUSE: Duration = Duration::from_secs(2);

struct MonitorState {
    status: ServerStatus,
    last_api_call: Instant,
    is_idle: bool,
}

/// Shared availability tracker. All writes go through the methods below so
/// the idle invariant (idle implies offline) holds at every step.
pub struct ServerMonitor {
    state: Mutex<MonitorState>,
    status_tx: watch::Sender<ServerStatus>,
}

impl ServerMonitor {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ServerStatus::Starting);
        Self {
            state: Mutex::new(MonitorState {
                status: ServerStatus::Starting,
                last_api_call: Instant::now(),
                is_idle: false,
            }),
            status_tx,
        }
    }

    /// Current believed status.
    pub fn status(&self) -> ServerStatus {
        self.state.lock().unwrap().status
    }

    #[allow(dead_code)]
    pub fn is_idle(&self) -> bool {
        self.state.lock().unwrap().is_idle
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status_tx.subscribe()
    }

    /// Stamp outbound API activity. Called at the start of every request.
    pub fn record_call(&self) {
        self.state.lock().unwrap().last_api_call = Instant::now();
    }

    /// A request completed successfully: clear idle and force online.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.is_idle = false;
        if state.status != ServerStatus::Online {
            state.status = ServerStatus::Online;
            let _ = self.status_tx.send(ServerStatus::Online);
        }
    }

    pub fn set_status(&self, status: ServerStatus) {
        let mut state = self.state.lock().unwrap();
        if state.status != status {
            state.status = status;
            let _ = self.status_tx.send(status);
        }
    }

    /// Compare elapsed time since the last request against the idle
    /// threshold. Crossing it marks the monitor idle and offline; returns
    /// true on that transition.
    pub fn check_idle(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.is_idle {
            return false;
        }
        if state.last_api_call.elapsed() < IDLE_THRESHOLD {
            return false;
        }
        state.is_idle = true;
        if state.status != ServerStatus::Offline {
            state.status = ServerStatus::Offline;
            let _ = self.status_tx.send(ServerStatus::Offline);
        }
        true
    }
}

impl Default for ServerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_threshold_flips_offline_and_success_restores_online() {
        let monitor = ServerMonitor::new();
        monitor.record_success();
        assert_eq!(monitor.status(), ServerStatus::Online);

        // Under the threshold nothing changes.
        tokio::time::advance(IDLE_THRESHOLD - Duration::from_secs(60)).await;
        assert!(!monitor.check_idle());
        assert_eq!(monitor.status(), ServerStatus::Online);

        // Crossing it sets idle and forces offline.
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(monitor.check_idle());
        assert!(monitor.is_idle());
        assert_eq!(monitor.status(), ServerStatus::Offline);

        // Already idle: no repeated transition.
        assert!(!monitor.check_idle());

        // The next successful call clears idle and restores online.
        monitor.record_success();
        assert!(!monitor.is_idle());
        assert_eq!(monitor.status(), ServerStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn api_activity_resets_the_idle_clock() {
        let monitor = ServerMonitor::new();
        monitor.record_success();

        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        monitor.record_call();
        // 14 minutes of silence, then a request: the clock restarts.
        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        assert!(!monitor.check_idle());
        assert_eq!(monitor.status(), ServerStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn status_changes_reach_subscribers() {
        let monitor = ServerMonitor::new();
        let mut rx = monitor.subscribe();
        assert_eq!(*rx.borrow(), ServerStatus::Starting);

        monitor.set_status(ServerStatus::Offline);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ServerStatus::Offline);

        monitor.record_success();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ServerStatus::Online);
    }
}
