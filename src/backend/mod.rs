//! Supervision of the out-of-process agent backend.
//!
//! The host does not embed the assistant's agent runtime; it runs as a
//! separate long-lived process that the host starts, health-checks,
//! monitors, and stops. [`BackendSupervisor`] is the single owner of that
//! child process and the single source of truth for its lifecycle:
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//!               ↓          ↓
//!             Failed ───────────→ Stopped
//! ```
//!
//! Construct one supervisor at the host's composition root and pass it by
//! reference; every start/stop/status path goes through it, and a failure
//! of the backend never propagates as a fault — `start()` reports `false`
//! and the host surfaces a retry affordance.

pub mod log_relay;
pub mod paths;
pub mod probe;
pub mod process;

use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use process::{BackendProcess, ProcessExit, ShutdownOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle states for the supervised backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No backend process exists.
    #[default]
    Stopped,
    /// A start attempt is in flight (spawning / waiting for readiness).
    Starting,
    /// The backend answered its health check and is accepting traffic.
    Running,
    /// A stop is in flight (grace period running).
    Stopping,
    /// A start attempt failed; resolved to `Stopped` by cleanup.
    Failed,
}

impl LifecycleState {
    /// Returns `true` while a process handle may exist.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Stopped, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting, Self::Failed)
                | (Self::Starting, Self::Stopping)
                | (Self::Running, Self::Stopping)
                | (Self::Running, Self::Failed)
                // Unexpected exit routes straight through cleanup.
                | (Self::Running, Self::Stopped)
                | (Self::Stopping, Self::Stopped)
                | (Self::Failed, Self::Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Read-only view of the supervisor for the host UI.
///
/// Recomputed on demand from the lifecycle state and the configuration,
/// never stored. Serialized camelCase for the UI bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Whether the backend is running and ready for traffic.
    pub is_running: bool,
    /// Host the backend binds to.
    pub host: String,
    /// Port the backend binds to.
    pub port: u16,
    /// The backend's WebSocket endpoint.
    pub server_url: String,
}

/// Mutable state guarded by the short-lived lock.
///
/// `process` is `Some` only while `state.is_active()`; the two fields are
/// always mutated together under the lock.
#[derive(Debug, Default)]
struct Shared {
    state: LifecycleState,
    process: Option<Arc<BackendProcess>>,
    /// Bumped on every start attempt and every cleanup, so a stale
    /// exit observer from an earlier incarnation cannot touch the state.
    generation: u64,
}

/// Supervises the agent backend process.
///
/// One instance per host process, constructed by the composition root.
/// `start()`/`stop()` serialize on an internal operation lock, so the
/// supervisor is safe to call repeatedly and concurrently from UI-driven
/// code: a `start()` racing another `start()` joins it and observes the
/// outcome; a `start()` while already running short-circuits to success.
pub struct BackendSupervisor {
    config: BackendConfig,
    http: reqwest::Client,
    /// Serializes start/stop; never held while merely reading state.
    op_lock: tokio::sync::Mutex<()>,
    shared: Arc<Mutex<Shared>>,
}

impl BackendSupervisor {
    /// Creates a supervisor for the given configuration. No process is
    /// spawned until [`start`](Self::start).
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            op_lock: tokio::sync::Mutex::new(()),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Returns the supervisor's configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lock_shared().state
    }

    /// Returns the backend's WebSocket endpoint, e.g. `ws://localhost:8765`.
    pub fn websocket_url(&self) -> String {
        self.config.websocket_url()
    }

    /// Returns a fresh status snapshot for the host UI.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_running: self.state() == LifecycleState::Running,
            host: self.config.host.clone(),
            port: self.config.port,
            server_url: self.config.websocket_url(),
        }
    }

    /// Starts the backend and waits until it is ready.
    ///
    /// Runs path resolution → launch → readiness probe. Returns `true` on
    /// success and when the backend is already running; returns `false`
    /// on any failure, after logging it and cleaning up whatever was
    /// spawned — no partially-started state survives.
    pub async fn start(&self) -> bool {
        match self.try_start().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "backend start failed");
                false
            }
        }
    }

    /// Stops the backend.
    ///
    /// With no backend process this logs a warning and returns — not an
    /// error. Otherwise sends the graceful termination signal, escalates
    /// to a forced kill after the grace period, and resets to `Stopped`.
    pub async fn stop(&self) {
        let _op = self.op_lock.lock().await;

        // Read the handle and enter Stopping atomically, so a concurrent
        // crash cleanup cannot interleave between the two.
        let process = {
            let mut shared = self.lock_shared();
            let process = shared.process.clone();
            if process.is_some() {
                set_state(&mut shared, LifecycleState::Stopping);
            }
            process
        };
        let Some(process) = process else {
            tracing::warn!("stop requested but backend is not running");
            return;
        };

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        match process.shutdown(grace).await {
            ShutdownOutcome::Graceful => tracing::info!("backend shut down gracefully"),
            ShutdownOutcome::Forced => tracing::warn!("backend required a forced kill"),
        }

        self.cleanup().await;
    }

    /// Stops the backend (if running) and starts it again.
    pub async fn restart(&self) -> bool {
        self.stop().await;
        self.start().await
    }

    // ── internals ────────────────────────────────────────────────────────

    async fn try_start(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        if self.state() == LifecycleState::Running {
            tracing::debug!("backend already running; start is a no-op");
            return Ok(());
        }

        let generation = {
            let mut shared = self.lock_shared();
            shared.generation += 1;
            set_state(&mut shared, LifecycleState::Starting);
            shared.generation
        };

        let resolved = paths::resolve(&self.config);
        let process = match process::launch(&self.config, &resolved) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                self.fail_and_cleanup().await;
                return Err(e);
            }
        };

        let mut exit_rx = process.exit_receiver();
        self.lock_shared().process = Some(Arc::clone(&process));
        self.spawn_exit_observer(process.exit_receiver(), generation);

        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        let url = self.config.health_url();
        if let Err(e) = probe::wait_ready(&self.http, &url, timeout, &mut exit_rx).await {
            self.fail_and_cleanup().await;
            return Err(e);
        }

        self.transition(LifecycleState::Running);

        // The exit observer only acts while Running; re-check here so an
        // exit landing between readiness and the transition is not lost.
        let current_exit = *exit_rx.borrow();
        if let Some(exit) = current_exit {
            self.cleanup().await;
            return Err(BackendError::ExitedDuringStartup { code: exit.code });
        }

        tracing::info!(url = %self.config.websocket_url(), "backend ready");
        Ok(())
    }

    /// Marks the in-flight attempt failed, then converges on cleanup.
    async fn fail_and_cleanup(&self) {
        self.transition(LifecycleState::Failed);
        self.cleanup().await;
    }

    /// The single convergence point for every exit from an active state:
    /// takes the handle, resets to `Stopped`, and makes sure the process
    /// is dead before returning.
    async fn cleanup(&self) {
        let process = {
            let mut shared = self.lock_shared();
            set_state(&mut shared, LifecycleState::Stopped);
            shared.generation += 1;
            shared.process.take()
        };

        if let Some(process) = process {
            process.kill();
            let mut exit_rx = process.exit_receiver();
            process::wait_exit(&mut exit_rx).await;
        }
    }

    /// Watches the exit broadcast and keeps `status()` truthful when the
    /// backend dies on its own while `Running`.
    fn spawn_exit_observer(
        &self,
        mut exit_rx: watch::Receiver<Option<ProcessExit>>,
        generation: u64,
    ) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let exit = process::wait_exit(&mut exit_rx).await;
            let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.generation == generation && shared.state == LifecycleState::Running {
                tracing::warn!(
                    code = exit.and_then(|e| e.code),
                    "backend exited unexpectedly"
                );
                shared.process = None;
                set_state(&mut shared, LifecycleState::Stopped);
            }
        });
    }

    fn transition(&self, target: LifecycleState) {
        set_state(&mut self.lock_shared(), target);
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for BackendSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSupervisor")
            .field("state", &self.state())
            .field("url", &self.config.websocket_url())
            .finish()
    }
}

/// Applies a state transition, logging it.
fn set_state(shared: &mut Shared, target: LifecycleState) {
    if shared.state == target {
        return;
    }
    debug_assert!(
        shared.state.can_transition_to(target),
        "invalid lifecycle transition: {} → {}",
        shared.state,
        target
    );
    tracing::debug!(from = %shared.state, to = %target, "lifecycle transition");
    shared.state = target;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    // ── LifecycleState ──

    #[test]
    fn initial_state_is_stopped() {
        assert_eq!(LifecycleState::default(), LifecycleState::Stopped);
    }

    #[test]
    fn active_states_are_the_handle_bearing_ones() {
        assert!(LifecycleState::Starting.is_active());
        assert!(LifecycleState::Running.is_active());
        assert!(LifecycleState::Stopping.is_active());
        assert!(!LifecycleState::Stopped.is_active());
        assert!(!LifecycleState::Failed.is_active());
    }

    #[test]
    fn valid_happy_path_transitions() {
        assert!(LifecycleState::Stopped.can_transition_to(LifecycleState::Starting));
        assert!(LifecycleState::Starting.can_transition_to(LifecycleState::Running));
        assert!(LifecycleState::Running.can_transition_to(LifecycleState::Stopping));
        assert!(LifecycleState::Stopping.can_transition_to(LifecycleState::Stopped));
    }

    #[test]
    fn failed_is_transient() {
        assert!(LifecycleState::Starting.can_transition_to(LifecycleState::Failed));
        assert!(LifecycleState::Failed.can_transition_to(LifecycleState::Stopped));
        // Failed never leads anywhere but Stopped.
        assert!(!LifecycleState::Failed.can_transition_to(LifecycleState::Starting));
        assert!(!LifecycleState::Failed.can_transition_to(LifecycleState::Running));
    }

    #[test]
    fn invalid_transitions_rejected() {
        assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Starting));
        assert!(!LifecycleState::Stopping.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Stopped));
    }

    #[test]
    fn display_labels() {
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
        assert_eq!(LifecycleState::Starting.to_string(), "starting");
        assert_eq!(LifecycleState::Running.to_string(), "running");
        assert_eq!(LifecycleState::Stopping.to_string(), "stopping");
        assert_eq!(LifecycleState::Failed.to_string(), "failed");
    }

    #[test]
    fn state_serde_labels() {
        let json = serde_json::to_string(&LifecycleState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    // ── StatusSnapshot ──

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = StatusSnapshot {
            is_running: true,
            host: "localhost".to_owned(),
            port: 8765,
            server_url: "ws://localhost:8765".to_owned(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"isRunning\":true"));
        assert!(json.contains("\"serverUrl\":\"ws://localhost:8765\""));
        assert!(!json.contains("is_running"));
    }

    // ── BackendSupervisor (process-free paths) ──

    #[test]
    fn fresh_supervisor_reports_stock_status() {
        let supervisor = BackendSupervisor::new(BackendConfig::default());
        let status = supervisor.status();
        assert!(!status.is_running);
        assert_eq!(status.host, "localhost");
        assert_eq!(status.port, 8765);
        assert_eq!(status.server_url, "ws://localhost:8765");
        assert_eq!(supervisor.websocket_url(), "ws://localhost:8765");
        assert_eq!(supervisor.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stop_without_backend_is_a_no_op() {
        let supervisor = BackendSupervisor::new(BackendConfig::default());
        supervisor.stop().await;
        supervisor.stop().await;
        assert_eq!(supervisor.state(), LifecycleState::Stopped);
    }

    #[test]
    fn supervisor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BackendSupervisor>();
        assert_send_sync::<StatusSnapshot>();
        assert_send_sync::<LifecycleState>();
    }
}
