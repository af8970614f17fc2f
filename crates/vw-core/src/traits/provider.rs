//! Provider traits

use std::sync::Arc;

use super::PortForwarder;
use crate::config::{ProviderSettings, TunnelSettings};
use crate::error::ProviderError;
use crate::types::{Connection, Server};

/// Resolves a provider implementation by name
pub trait ProviderSelector: Send + Sync {
    /// Build the provider for `name` over the given server list
    fn resolve(&self, name: &str, servers: &[Server]) -> Result<Arc<dyn Provider>, ProviderError>;
}

/// A VPN provider: picks a server and produces tunnel configuration
pub trait Provider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Pick a connection among the servers matching `settings`.
    ///
    /// With port forwarding enabled only servers supporting it qualify.
    fn connection(&self, settings: &ProviderSettings) -> Result<Connection, ProviderError>;

    /// Tunnel configuration lines for `connection`
    fn tunnel_config(&self, connection: &Connection, settings: &TunnelSettings) -> Vec<String>;

    /// Port forwarding collaborator for this provider
    fn port_forwarder(&self) -> Arc<dyn PortForwarder>;
}
