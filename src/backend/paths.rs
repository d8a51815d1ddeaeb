//! Interpreter and entry-point resolution for the agent backend.
//!
//! Resolution is best-effort and never fails: the resolver probes the
//! isolated interpreter installs for the current OS, then the system
//! `PATH`, and finally falls back to a bare command name with a warning.
//! A bad path surfaces later as a spawn failure, which the supervisor
//! already handles.

use crate::config::{BackendConfig, PackagingMode};
use std::path::{Path, PathBuf};

/// Resolved locations for launching the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Interpreter to invoke (absolute path or bare command name).
    pub interpreter: PathBuf,
    /// Entry-point script passed to the interpreter.
    pub entry_point: PathBuf,
}

/// Resolves the interpreter and entry point from the configuration.
///
/// Explicit config overrides always win. Otherwise the entry point is
/// derived from the packaging mode and the interpreter from the probe
/// order described in [`interpreter_candidates`].
pub fn resolve(config: &BackendConfig) -> ResolvedPaths {
    let entry_point = config
        .entry_point
        .clone()
        .unwrap_or_else(|| default_entry_point(config));

    let interpreter = config
        .interpreter
        .clone()
        .unwrap_or_else(|| discover_interpreter(&entry_point));

    ResolvedPaths {
        interpreter,
        entry_point,
    }
}

/// Returns the default entry-point path for the packaging mode.
///
/// - Development: `{project_root}/backend/main.py`
/// - Packaged: `{exe_dir}/backend/main.py` (adjacent to the installed bundle)
fn default_entry_point(config: &BackendConfig) -> PathBuf {
    let base = match config.packaging {
        PackagingMode::Development => config.effective_project_root(),
        PackagingMode::Packaged => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| config.effective_project_root()),
    };
    base.join("backend").join("main.py")
}

/// Probes the interpreter candidates and returns the first that exists.
///
/// Falls back to the bare command name with a warning when no isolated
/// install is present; that is an expected condition on machines that rely
/// on a system-wide python.
fn discover_interpreter(entry_point: &Path) -> PathBuf {
    for candidate in interpreter_candidates(entry_point) {
        if candidate.is_file() {
            tracing::debug!(interpreter = %candidate.display(), "found isolated interpreter");
            return candidate;
        }
    }

    if let Ok(found) = which::which(bare_interpreter_name()) {
        tracing::debug!(interpreter = %found.display(), "using interpreter from PATH");
        return found;
    }

    tracing::warn!(
        command = bare_interpreter_name(),
        "no isolated interpreter found; falling back to bare command name"
    );
    PathBuf::from(bare_interpreter_name())
}

/// Ordered list of isolated interpreter installs to probe.
///
/// 1. The backend's own virtual env, next to the entry point.
/// 2. The per-user managed env under the home directory.
///
/// Path shapes differ per OS family (`Scripts\python.exe` on Windows,
/// `bin/python3` elsewhere).
pub fn interpreter_candidates(entry_point: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);

    if let Some(backend_dir) = entry_point.parent() {
        candidates.push(backend_dir.join(".venv").join(venv_interpreter_suffix()));
    }

    if let Some(home) = dirs::home_dir() {
        candidates.push(
            home.join(".luna")
                .join("agent-env")
                .join(venv_interpreter_suffix()),
        );
    }

    candidates
}

/// Relative interpreter path inside a virtual env for the current OS.
fn venv_interpreter_suffix() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("Scripts").join("python.exe")
    } else {
        PathBuf::from("bin").join("python3")
    }
}

/// Bare interpreter command name for the current OS.
pub fn bare_interpreter_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}
