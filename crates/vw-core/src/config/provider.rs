//! VPN provider settings

use serde::{Deserialize, Serialize};

use crate::types::Protocol;

/// Settings for the VPN provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider name, used to resolve the provider implementation
    pub name: String,

    /// Which servers are eligible for a connection
    pub selection: ServerSelection,

    /// Port forwarding behaviour once the tunnel is up
    pub port_forwarding: PortForwardingSettings,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            selection: ServerSelection::default(),
            port_forwarding: PortForwardingSettings::default(),
        }
    }
}

/// Server filters; empty lists match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSelection {
    pub protocol: Protocol,
    /// Custom remote port; defaults to the protocol's standard port
    pub port: Option<u16>,
    pub regions: Vec<String>,
    pub countries: Vec<String>,
    pub cities: Vec<String>,
    pub hostnames: Vec<String>,
}

/// Port forwarding settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortForwardingSettings {
    pub enabled: bool,
}
