//! Luna host: supervision of the assistant's out-of-process agent backend.
//!
//! The Luna desktop app keeps its voice/agent runtime in a separate
//! backend process and talks to it over a local WebSocket. This crate is
//! the host side of that arrangement: it resolves where the backend and
//! its interpreter live (development tree or installed bundle), launches
//! the process with piped stdio, relays its output into the host's logs,
//! waits for the health endpoint to answer, and tears the process down
//! with a graceful-then-forced shutdown.
//!
//! # Architecture
//!
//! - **paths**: best-effort interpreter + entry-point resolution
//! - **process**: spawn, monitor task, signal channel, exit broadcast
//! - **log relay**: child stdout/stderr → `tracing`
//! - **probe**: HTTP readiness polling with bounded wait
//! - **supervisor**: lifecycle state machine and the host-facing API
//!
//! # Usage
//!
//! The composition root constructs exactly one [`BackendSupervisor`] and
//! passes it by reference to whatever triggers start/stop:
//!
//! ```no_run
//! use luna_host::{BackendConfig, BackendSupervisor};
//!
//! # async fn run() {
//! let supervisor = BackendSupervisor::new(BackendConfig::default());
//! if supervisor.start().await {
//!     let url = supervisor.websocket_url(); // ws://localhost:8765
//!     // hand `url` to the UI's WebSocket client …
//! }
//! supervisor.stop().await;
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;

pub use backend::{BackendSupervisor, LifecycleState, StatusSnapshot};
pub use config::{BackendConfig, PackagingMode};
pub use error::{BackendError, Result};
