//! Built-in server-list provider
//!
//! Picks a random server from the configured list after filtering it with
//! the server selection, and generates a plain OpenVPN client config for it.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use vw_core::config::{ProviderSettings, TunnelSettings};
use vw_core::error::{PortForwardError, ProviderError};
use vw_core::traits::{PortForwarder, Provider, ProviderSelector};
use vw_core::types::Protocol;
use vw_core::{Connection, Server};

/// Name of the built-in provider
pub const CUSTOM_PROVIDER: &str = "custom";

const DEFAULT_UDP_PORT: u16 = 1194;
const DEFAULT_TCP_PORT: u16 = 443;

/// Resolves provider names to the built-in providers
pub struct DefaultProviderSelector {
    port_forwarder: Arc<dyn PortForwarder>,
}

impl DefaultProviderSelector {
    /// Selector whose providers cannot forward ports
    pub fn new() -> Self {
        Self::with_port_forwarder(Arc::new(UnsupportedPortForwarder))
    }

    /// Selector whose providers use `port_forwarder`
    pub fn with_port_forwarder(port_forwarder: Arc<dyn PortForwarder>) -> Self {
        Self { port_forwarder }
    }
}

impl Default for DefaultProviderSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderSelector for DefaultProviderSelector {
    fn resolve(&self, name: &str, servers: &[Server]) -> Result<Arc<dyn Provider>, ProviderError> {
        if !name.eq_ignore_ascii_case(CUSTOM_PROVIDER) {
            return Err(ProviderError::Unknown(name.to_string()));
        }
        Ok(Arc::new(ServerListProvider::new(
            servers.to_vec(),
            Arc::clone(&self.port_forwarder),
        )))
    }
}

/// Provider over a static server list
pub struct ServerListProvider {
    servers: Vec<Server>,
    port_forwarder: Arc<dyn PortForwarder>,
}

impl ServerListProvider {
    pub fn new(servers: Vec<Server>, port_forwarder: Arc<dyn PortForwarder>) -> Self {
        Self {
            servers,
            port_forwarder,
        }
    }

    /// Servers matching `settings`, in list order
    pub fn filter(&self, settings: &ProviderSettings) -> Vec<&Server> {
        let selection = &settings.selection;
        let port_forward_only = settings.port_forwarding.enabled;
        self.servers
            .iter()
            .filter(|server| !port_forward_only || server.port_forward)
            .filter(|server| server.supports(selection.protocol))
            .filter(|server| matches_any(&selection.regions, &server.region))
            .filter(|server| matches_any(&selection.countries, &server.country))
            .filter(|server| matches_any(&selection.cities, &server.city))
            .filter(|server| matches_any(&selection.hostnames, &server.hostname))
            .collect()
    }
}

impl Provider for ServerListProvider {
    fn name(&self) -> &str {
        CUSTOM_PROVIDER
    }

    fn connection(&self, settings: &ProviderSettings) -> Result<Connection, ProviderError> {
        let selection = &settings.selection;
        if selection.port == Some(0) {
            return Err(ProviderError::InvalidSelection(
                "port cannot be 0".to_string(),
            ));
        }

        let candidates: Vec<&Server> = self
            .filter(settings)
            .into_iter()
            .filter(|server| !server.ips.is_empty())
            .collect();

        let mut rng = rand::thread_rng();
        let server = candidates
            .choose(&mut rng)
            .ok_or_else(|| ProviderError::NoServerFound(describe_selection(settings)))?;
        let ip = server
            .ips
            .choose(&mut rng)
            .copied()
            .ok_or_else(|| ProviderError::NoServerFound(describe_selection(settings)))?;

        let port = selection.port.unwrap_or(match selection.protocol {
            Protocol::Udp => DEFAULT_UDP_PORT,
            Protocol::Tcp => DEFAULT_TCP_PORT,
        });

        Ok(Connection {
            hostname: server.hostname.clone(),
            ip,
            port,
            protocol: selection.protocol,
        })
    }

    fn tunnel_config(&self, connection: &Connection, settings: &TunnelSettings) -> Vec<String> {
        let proto = match connection.protocol {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp-client",
        };

        let mut lines = vec![
            "client".to_string(),
            format!("dev {}", settings.interface),
            "nobind".to_string(),
            "persist-key".to_string(),
            "remote-cert-tls server".to_string(),
            format!("proto {}", proto),
            format!("remote {} {}", connection.ip, connection.port),
        ];

        if let Some(auth_file) = &settings.auth_file {
            lines.push(format!("auth-user-pass {}", auth_file.display()));
        }

        lines.push(format!("verb {}", settings.verbosity));

        if !settings.ipv6 {
            lines.push(r#"pull-filter ignore "route-ipv6""#.to_string());
            lines.push(r#"pull-filter ignore "ifconfig-ipv6""#.to_string());
        }

        lines
    }

    fn port_forwarder(&self) -> Arc<dyn PortForwarder> {
        Arc::clone(&self.port_forwarder)
    }
}

/// Port forwarder for providers without port forwarding
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPortForwarder;

#[async_trait]
impl PortForwarder for UnsupportedPortForwarder {
    async fn start(&self, server_name: &str) -> Result<(), PortForwardError> {
        Err(PortForwardError::Unsupported(server_name.to_string()))
    }

    async fn stop(&self) -> Result<(), PortForwardError> {
        Ok(())
    }
}

/// Empty filters match everything
fn matches_any(filter: &[String], value: &str) -> bool {
    filter.is_empty() || filter.iter().any(|f| f.eq_ignore_ascii_case(value))
}

fn describe_selection(settings: &ProviderSettings) -> String {
    let selection = &settings.selection;
    let mut parts = vec![
        "for VPN openvpn".to_string(),
        format!("protocol {}", selection.protocol),
    ];

    let filters = [
        ("region", &selection.regions),
        ("country", &selection.countries),
        ("city", &selection.cities),
        ("hostname", &selection.hostnames),
    ];
    for (label, values) in filters {
        if !values.is_empty() {
            parts.push(format!("{} {}", label, values.join(", ").to_lowercase()));
        }
    }

    if settings.port_forwarding.enabled {
        parts.push("port forwarding only".to_string());
    }

    parts.join("; ")
}
