//! Readiness probing of the backend's health endpoint.
//!
//! A freshly spawned backend needs a moment before it can accept traffic;
//! being spawned and being ready are distinct. The prober polls
//! `GET {health_url}` on a fixed interval until the backend answers with a
//! non-error status, the startup deadline passes, or the process exits —
//! whichever comes first.

use super::process::ProcessExit;
use crate::error::{BackendError, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Fixed interval between health polls (and per-request timeout).
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits until the backend answers its health endpoint.
///
/// Connection failures are expected while the backend is still booting and
/// are retried silently; an error status (4xx/5xx) likewise counts as "not
/// yet ready". The wait is a suspend point in the caller's async flow, not
/// a busy loop, and it races the process's exit broadcast so a dying child
/// is noticed immediately instead of at the deadline.
///
/// # Errors
///
/// - [`BackendError::ExitedDuringStartup`] — the process exited first.
/// - [`BackendError::ReadinessTimeout`] — the deadline passed.
pub async fn wait_ready(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
    exit: &mut watch::Receiver<Option<ProcessExit>>,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(e) = *exit.borrow_and_update() {
            return Err(BackendError::ExitedDuringStartup { code: e.code });
        }

        match http.get(url).timeout(POLL_INTERVAL).send().await {
            Ok(resp) if is_healthy(resp.status()) => {
                tracing::debug!(%url, status = %resp.status(), "backend is ready");
                return Ok(());
            }
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "health endpoint answered but not healthy");
            }
            Err(e) => {
                tracing::trace!(error = %e, "health endpoint not reachable yet");
            }
        }

        if Instant::now() >= deadline {
            return Err(BackendError::ReadinessTimeout {
                timeout_secs: timeout.as_secs(),
            });
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = exit.changed() => {}
        }
    }
}

/// Any non-error HTTP response counts as healthy.
fn is_healthy(status: reqwest::StatusCode) -> bool {
    !status.is_client_error() && !status.is_server_error()
}
