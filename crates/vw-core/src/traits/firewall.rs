//! Firewall trait

use async_trait::async_trait;

use crate::error::FirewallError;
use crate::types::Connection;

/// Firewall rule engine, keyed by tunnel interface
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Allow traffic to the VPN server and through the tunnel interface
    async fn allow_vpn_connection(
        &self,
        connection: &Connection,
        interface: &str,
    ) -> Result<(), FirewallError>;
}
