//! Forwards the backend's stdout/stderr into the host's tracing sink.
//!
//! One detached task per stream. stdout lines are logged at info, stderr
//! lines at warn, both tagged with the stream name so the origin is
//! unambiguous in the host's logs. Forwarding is fire-and-forget: ordering
//! is best-effort per stream, and a read error simply ends that stream's
//! task without touching the supervisor's lifecycle state.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

/// Join handles for the two relay tasks.
///
/// The supervisor never awaits these; they exist so tests can wait for
/// stream EOF deterministically.
#[derive(Debug)]
pub struct LogRelayHandles {
    /// Task draining the backend's stdout.
    pub stdout: JoinHandle<()>,
    /// Task draining the backend's stderr.
    pub stderr: JoinHandle<()>,
}

/// Spawns the relay tasks for a freshly launched backend.
pub fn spawn_relays(stdout: ChildStdout, stderr: ChildStderr) -> LogRelayHandles {
    let stdout = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(stream = "stdout", "[backend] {line}");
        }
    });

    let stderr = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::warn!(stream = "stderr", "[backend] {line}");
        }
    });

    LogRelayHandles { stdout, stderr }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::process::Stdio;

    fn spawn_chatty_child() -> tokio::process::Child {
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo out-one; echo out-two; echo err-one >&2")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn sh")
    }

    #[tokio::test]
    async fn relays_drain_to_eof() {
        let mut child = spawn_chatty_child();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let handles = spawn_relays(stdout, stderr);

        // Both tasks must complete once the child exits and closes its pipes.
        handles.stdout.await.expect("stdout relay");
        handles.stderr.await.expect("stderr relay");
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn relay_survives_abrupt_child_exit() {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo only-line; exit 3")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn sh");
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let handles = spawn_relays(stdout, stderr);
        handles.stdout.await.expect("stdout relay");
        handles.stderr.await.expect("stderr relay");
        let _ = child.wait().await;
    }
}
