//! vw-supervisor: OpenVPN tunnel supervisor for vpnwarden
//!
//! The supervisor owns the tunnel lifecycle: it resolves a server, starts
//! the OpenVPN process, watches its output for the tunnel-up marker to
//! start port forwarding, restarts it with backoff when it crashes and
//! tears everything down in order when asked to stop.

pub mod control;
pub mod firewall;
pub mod ipc;
pub mod process;
pub mod provider;
pub mod state;
pub mod status;
pub mod tunnel;

pub use control::{ControlError, Controller};
pub use state::SettingsStore;
pub use status::StatusManager;
pub use tunnel::{Supervisor, SupervisorDeps, SupervisorOptions};
