//! Firewall that only records what it is asked to allow
//!
//! Used when the daemon runs without a rule engine, for example on a host
//! whose firewall is managed elsewhere.

use std::sync::Mutex;

use async_trait::async_trait;

use vw_core::error::FirewallError;
use vw_core::traits::Firewall;
use vw_core::Connection;

/// Allows everything and remembers the last allowed connection
#[derive(Debug, Default)]
pub struct PassthroughFirewall {
    last_allowed: Mutex<Option<Connection>>,
}

impl PassthroughFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection most recently allowed
    pub fn last_allowed(&self) -> Option<Connection> {
        self.last_allowed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Firewall for PassthroughFirewall {
    async fn allow_vpn_connection(
        &self,
        connection: &Connection,
        interface: &str,
    ) -> Result<(), FirewallError> {
        if interface.is_empty() {
            return Err(FirewallError::Rule {
                interface: interface.to_string(),
                message: "tunnel interface name is empty".to_string(),
            });
        }

        tracing::debug!("Allowing {} through {}", connection, interface);
        *self
            .last_allowed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(connection.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vw_core::types::Protocol;

    fn connection() -> Connection {
        Connection {
            hostname: "nl1.example".to_string(),
            ip: "10.0.0.1".parse().unwrap(),
            port: 1194,
            protocol: Protocol::Udp,
        }
    }

    #[tokio::test]
    async fn test_records_allowed_connection() {
        let firewall = PassthroughFirewall::new();
        firewall
            .allow_vpn_connection(&connection(), "tun0")
            .await
            .unwrap();

        assert_eq!(firewall.last_allowed(), Some(connection()));
    }

    #[tokio::test]
    async fn test_rejects_empty_interface() {
        let firewall = PassthroughFirewall::new();
        let result = firewall.allow_vpn_connection(&connection(), "").await;

        assert!(matches!(result, Err(FirewallError::Rule { .. })));
        assert_eq!(firewall.last_allowed(), None);
    }
}
