//! Launching and signalling of the backend child process.
//!
//! The spawned [`tokio::process::Child`] is owned by a detached monitor
//! task; the supervisor holds a [`BackendProcess`] handle carrying the pid,
//! a signal channel into the monitor, and a watch receiver that resolves
//! once the process has exited. This keeps exit observation event-driven:
//! the readiness probe, the shutdown grace race, and the unexpected-exit
//! observer all watch the same exit broadcast.

use super::log_relay;
use super::paths::ResolvedPaths;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

/// Environment variable pointing the backend at its own module directory.
pub const ADDITIONAL_MODULE_PATH: &str = "ADDITIONAL_MODULE_PATH";

/// Signals the supervisor can send to the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessSignal {
    /// Ask the process to shut down cleanly (SIGTERM on Unix).
    Terminate,
    /// Take the process down unconditionally.
    Kill,
}

/// Exit information broadcast once the monitor observes the process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// The exit code, if the process exited normally.
    pub code: Option<i32>,
}

/// How a [`BackendProcess::shutdown`] concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The process exited within the grace period.
    Graceful,
    /// The grace period elapsed and the process was killed.
    Forced,
}

/// Handle to a running backend process.
///
/// Exclusively owned by the supervisor; the OS child itself lives in the
/// monitor task and is reaped there. All methods are non-blocking — waits
/// go through the receiver returned by
/// [`exit_receiver`](Self::exit_receiver).
#[derive(Debug)]
pub struct BackendProcess {
    pid: Option<u32>,
    signals: mpsc::Sender<ProcessSignal>,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl BackendProcess {
    /// Returns the OS process id, if the process was alive at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Requests graceful termination. Best-effort; a no-op once the
    /// process has exited.
    pub fn terminate(&self) {
        let _ = self.signals.try_send(ProcessSignal::Terminate);
    }

    /// Requests an unconditional kill. Best-effort; a no-op once the
    /// process has exited.
    pub fn kill(&self) {
        let _ = self.signals.try_send(ProcessSignal::Kill);
    }

    /// Returns a fresh receiver for the exit broadcast.
    pub fn exit_receiver(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit.clone()
    }

    /// Returns `true` once the monitor has observed the process exit.
    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Graceful-then-forced shutdown.
    ///
    /// Sends the graceful termination signal, then races the exit
    /// broadcast against a grace timer. Whichever loses is cancelled by
    /// drop; on grace expiry the forced kill goes out and the exit is
    /// awaited (a kill is definitive, so this wait is bounded).
    pub async fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        self.terminate();
        let mut exit_rx = self.exit_receiver();

        let exited_in_time = tokio::select! {
            _ = wait_exit(&mut exit_rx) => true,
            () = tokio::time::sleep(grace) => false,
        };
        if exited_in_time {
            return ShutdownOutcome::Graceful;
        }

        tracing::warn!(
            grace_secs = grace.as_secs(),
            "backend ignored graceful termination; killing"
        );
        self.kill();
        wait_exit(&mut exit_rx).await;
        ShutdownOutcome::Forced
    }
}

/// Waits until the exit broadcast carries a value and returns it.
pub(crate) async fn wait_exit(
    rx: &mut watch::Receiver<Option<ProcessExit>>,
) -> Option<ProcessExit> {
    // Copy the value out of the watch `Ref` and drop the borrow-holding
    // `Result` before the fallback, which needs to borrow `rx` again.
    let waited = rx.wait_for(Option::is_some).await.ok().map(|exit| *exit);
    match waited {
        Some(exit) => exit,
        // Monitor gone without a broadcast; report whatever is current.
        None => *rx.borrow(),
    }
}

/// Spawns the backend process described by the resolved paths.
///
/// The entry point must exist on disk; otherwise this fails fast with
/// [`BackendError::ScriptNotFound`] before any spawn attempt. The child
/// runs with the project root as its working directory (relative imports
/// stay stable regardless of where the script lives), the host's
/// environment plus [`ADDITIONAL_MODULE_PATH`] and the configured extras,
/// and all three stdio streams piped. The log relay and the monitor task
/// are attached before this returns, so no output or exit event can be
/// missed.
///
/// # Errors
///
/// - [`BackendError::ScriptNotFound`] — entry point missing on disk.
/// - [`BackendError::Spawn`] — the OS failed to create the process.
pub fn launch(config: &BackendConfig, paths: &ResolvedPaths) -> Result<BackendProcess> {
    if !paths.entry_point.is_file() {
        return Err(BackendError::ScriptNotFound {
            path: paths.entry_point.clone(),
        });
    }

    let module_dir = paths
        .entry_point
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut command = Command::new(&paths.interpreter);
    command
        .arg(&paths.entry_point)
        .current_dir(config.effective_project_root())
        .env(ADDITIONAL_MODULE_PATH, &module_dir)
        .envs(&config.extra_env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(BackendError::Spawn)?;
    let pid = child.id();

    if let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) {
        log_relay::spawn_relays(stdout, stderr);
    }

    let (signal_tx, signal_rx) = mpsc::channel(4);
    let (exit_tx, exit_rx) = watch::channel(None);
    tokio::spawn(monitor(child, signal_rx, exit_tx));

    tracing::info!(
        pid,
        interpreter = %paths.interpreter.display(),
        entry = %paths.entry_point.display(),
        "backend process spawned"
    );

    Ok(BackendProcess {
        pid,
        signals: signal_tx,
        exit: exit_rx,
    })
}

/// What woke the monitor loop.
enum MonitorEvent {
    Exited(std::io::Result<std::process::ExitStatus>),
    Signal(Option<ProcessSignal>),
}

/// Owns the child: forwards signals to it and broadcasts its exit.
async fn monitor(
    mut child: Child,
    mut signals: mpsc::Receiver<ProcessSignal>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let status = loop {
        let event = tokio::select! {
            status = child.wait() => MonitorEvent::Exited(status),
            sig = signals.recv() => MonitorEvent::Signal(sig),
        };
        match event {
            MonitorEvent::Exited(status) => break status,
            MonitorEvent::Signal(Some(ProcessSignal::Terminate)) => send_terminate(&mut child),
            MonitorEvent::Signal(Some(ProcessSignal::Kill)) => {
                let _ = child.start_kill();
            }
            MonitorEvent::Signal(None) => {
                // Every handle is gone; nothing can reach this child any
                // more, so take it down rather than leak it.
                let _ = child.start_kill();
                break child.wait().await;
            }
        }
    };

    let code = status.ok().and_then(|s| s.code());
    tracing::debug!(code, "backend process exited");
    let _ = exit_tx.send(Some(ProcessExit { code }));
}

/// Delivers the graceful termination signal for the current platform.
#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    }
}

/// Windows has no SIGTERM equivalent the child could trap; forced kill is
/// the only termination we can deliver.
#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
