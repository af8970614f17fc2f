//! Tunnel process management

mod exit;
mod openvpn;

pub use exit::{ExitNotifier, ExitResult, ExitSignal};
pub use openvpn::OpenVpnRunner;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vw_core::config::TunnelSettings;
use vw_core::error::ProcessError;

/// Handles to a started tunnel process
#[derive(Debug)]
pub struct ProcessHandles {
    /// Lines written to stdout, in order
    pub stdout: mpsc::Receiver<String>,
    /// Lines written to stderr, in order
    pub stderr: mpsc::Receiver<String>,
    /// Fires once when the process ends, for whatever reason
    pub exit: ExitSignal,
}

/// Starts the tunnel client as a managed subprocess
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Write the tunnel configuration the process will be started with
    async fn write_config(
        &self,
        lines: &[String],
        settings: &TunnelSettings,
    ) -> Result<(), ProcessError>;

    /// Spawn the process for `settings.version` with `settings.flags`.
    ///
    /// Cancelling `scope` terminates the process; the exit signal fires
    /// once it is gone.
    async fn start(
        &self,
        scope: CancellationToken,
        settings: &TunnelSettings,
    ) -> Result<ProcessHandles, ProcessError>;
}
