//! Port forwarding trait

use async_trait::async_trait;

use crate::error::PortForwardError;

/// Port forwarding session tied to an established tunnel
///
/// Whether port forwarding is enabled and how long a stop may take are
/// decided by the caller; implementations only start and stop.
#[async_trait]
pub trait PortForwarder: Send + Sync {
    /// Request a forwarded port from the server the tunnel is connected to
    async fn start(&self, server_name: &str) -> Result<(), PortForwardError>;

    /// Release the forwarded port; returns once fully stopped
    async fn stop(&self) -> Result<(), PortForwardError>;
}
