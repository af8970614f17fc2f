//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::config::{ProviderSettings, TunnelSettings};

/// Lifecycle status of the supervised tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No tunnel process is running and none will start until asked
    Stopped,
    /// A start was requested and is pending
    Starting,
    /// The tunnel process is running
    Running,
    /// Setup or the tunnel process failed; a retry is scheduled
    Crashed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Stopped => write!(f, "stopped"),
            Status::Starting => write!(f, "starting"),
            Status::Running => write!(f, "running"),
            Status::Crashed => write!(f, "crashed"),
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stopped" => Ok(Status::Stopped),
            "starting" => Ok(Status::Starting),
            "running" => Ok(Status::Running),
            "crashed" => Ok(Status::Crashed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Transport protocol used by the tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// A VPN server entry from the server list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub hostname: String,
    pub region: String,
    pub country: String,
    pub city: String,
    pub ips: Vec<IpAddr>,
    pub tcp: bool,
    pub udp: bool,
    /// Whether the server offers port forwarding
    pub port_forward: bool,
}

impl Server {
    /// Whether the server accepts connections over `protocol`
    pub fn supports(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Tcp => self.tcp,
            Protocol::Udp => self.udp,
        }
    }
}

/// Server and protocol parameters resolved for one supervisor iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub hostname: String,
    pub ip: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}/{})",
            self.hostname, self.ip, self.port, self.protocol
        )
    }
}

/// Settings read atomically at the start of each supervisor iteration
#[derive(Debug, Clone, Default)]
pub struct SettingsSnapshot {
    pub tunnel: TunnelSettings,
    pub provider: ProviderSettings,
    pub servers: Vec<Server>,
}
