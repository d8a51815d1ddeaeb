//! Configuration for the backend supervisor.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How the host application is packaged.
///
/// Determines where the backend's entry point and interpreter are looked
/// for: in development the backend lives inside the project source tree,
/// in a packaged install it sits adjacent to the host's own bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingMode {
    /// Running from the project source tree.
    #[default]
    Development,
    /// Running from an installed bundle.
    Packaged,
}

/// Configuration for supervising the agent backend process.
///
/// Created once at host startup and treated as immutable for the lifetime
/// of the supervisor. All fields have sensible defaults; a host that wants
/// the stock `ws://localhost:8765` backend needs no configuration at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Host the backend binds to.
    pub host: String,
    /// Port the backend binds to.
    pub port: u16,
    /// Explicit interpreter path. When unset, the path resolver probes the
    /// isolated interpreter installs and falls back to a bare command name.
    pub interpreter: Option<PathBuf>,
    /// Explicit entry-point script path. When unset, derived from
    /// `packaging` and `project_root`.
    pub entry_point: Option<PathBuf>,
    /// Project root used as the backend's working directory and as the base
    /// for development-mode path resolution. Defaults to the current
    /// directory.
    pub project_root: Option<PathBuf>,
    /// Packaging mode of the host application.
    pub packaging: PackagingMode,
    /// Extra environment variables passed to the backend process.
    pub extra_env: BTreeMap<String, String>,
    /// Path of the readiness endpoint on the backend's HTTP server.
    pub health_path: String,
    /// Maximum time to wait for the backend to become ready, in seconds.
    pub startup_timeout_secs: u64,
    /// Grace period between the graceful termination signal and the forced
    /// kill, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8765,
            interpreter: None,
            entry_point: None,
            project_root: None,
            packaging: PackagingMode::Development,
            extra_env: BTreeMap::new(),
            health_path: "/health".to_owned(),
            startup_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl BackendConfig {
    /// Loads a configuration from a TOML file.
    ///
    /// Missing fields take their defaults, so a partial file is fine.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            BackendError::Config(format!("cannot parse config {}: {e}", path.display()))
        })
    }

    /// Returns the readiness-check URL, e.g. `http://localhost:8765/health`.
    pub fn health_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.health_path)
    }

    /// Returns the backend's WebSocket endpoint, e.g. `ws://localhost:8765`.
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Returns the effective project root (configured or current directory).
    pub fn effective_project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_match_stock_backend() {
        let config = BackendConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8765);
        assert_eq!(config.health_path, "/health");
        assert_eq!(config.startup_timeout_secs, 30);
        assert_eq!(config.shutdown_grace_secs, 5);
        assert_eq!(config.packaging, PackagingMode::Development);
        assert!(config.interpreter.is_none());
        assert!(config.entry_point.is_none());
        assert!(config.extra_env.is_empty());
    }

    #[test]
    fn health_url_format() {
        let config = BackendConfig::default();
        assert_eq!(config.health_url(), "http://localhost:8765/health");
    }

    #[test]
    fn websocket_url_format() {
        let config = BackendConfig {
            host: "127.0.0.1".to_owned(),
            port: 9100,
            ..Default::default()
        };
        assert_eq!(config.websocket_url(), "ws://127.0.0.1:9100");
    }

    #[test]
    fn serde_round_trip() {
        let config = BackendConfig {
            port: 9000,
            packaging: PackagingMode::Packaged,
            extra_env: [("LUNA_LOG".to_owned(), "debug".to_owned())].into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: BackendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.port, 9000);
        assert_eq!(restored.packaging, PackagingMode::Packaged);
        assert_eq!(restored.extra_env.get("LUNA_LOG").unwrap(), "debug");
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config: BackendConfig = toml::from_str("port = 9999\n").unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.health_path, "/health");
    }

    #[test]
    fn packaging_mode_serde_labels() {
        let json = serde_json::to_string(&PackagingMode::Development).unwrap();
        assert_eq!(json, "\"development\"");
        let json = serde_json::to_string(&PackagingMode::Packaged).unwrap();
        assert_eq!(json, "\"packaged\"");
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = BackendConfig::load(Path::new("/nonexistent/luna.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/luna.toml"));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("luna.toml");
        std::fs::write(&path, "host = \"0.0.0.0\"\nstartup_timeout_secs = 10\n").unwrap();
        let config = BackendConfig::load(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.startup_timeout_secs, 10);
        assert_eq!(config.port, 8765);
    }
}
