//! Tunnel (OpenVPN) process settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// OpenVPN release line the tunnel process is started with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenVpnVersion {
    #[serde(rename = "2.4")]
    V2_4,
    #[default]
    #[serde(rename = "2.5")]
    V2_5,
}

impl OpenVpnVersion {
    /// Binary name installed for this release line
    pub fn binary_name(&self) -> &'static str {
        match self {
            OpenVpnVersion::V2_4 => "openvpn2.4",
            OpenVpnVersion::V2_5 => "openvpn2.5",
        }
    }
}

impl fmt::Display for OpenVpnVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenVpnVersion::V2_4 => write!(f, "2.4"),
            OpenVpnVersion::V2_5 => write!(f, "2.5"),
        }
    }
}

/// Settings for the tunnel client process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Explicit executable path; overrides the version-derived binary name
    pub executable: Option<PathBuf>,

    /// OpenVPN release line
    pub version: OpenVpnVersion,

    /// Extra command-line flags, passed before `--config <path>`
    pub flags: Vec<String>,

    /// Tunnel network interface name
    pub interface: String,

    /// Where the generated tunnel configuration is written
    pub config_path: PathBuf,

    /// Credentials file referenced by `auth-user-pass`
    pub auth_file: Option<PathBuf>,

    /// OpenVPN log verbosity (`verb`)
    pub verbosity: u8,

    /// Whether IPv6 routes pushed by the server are accepted
    pub ipv6: bool,

    /// How long a cancelled process gets between SIGTERM and SIGKILL
    #[serde(with = "duration_secs")]
    pub kill_grace: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            executable: None,
            version: OpenVpnVersion::default(),
            flags: vec![],
            interface: "tun0".to_string(),
            config_path: super::default_config_dir().join("tunnel.ovpn"),
            auth_file: None,
            verbosity: 1,
            ipv6: false,
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl TunnelSettings {
    /// Program to execute for the tunnel process
    pub fn program(&self) -> PathBuf {
        self.executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.version.binary_name()))
    }
}
