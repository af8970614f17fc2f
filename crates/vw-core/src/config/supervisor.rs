//! Supervisor daemon configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use super::{ProviderSettings, TunnelSettings};
use crate::error::ConfigError;
use crate::types::{Server, SettingsSnapshot};

/// Configuration for the supervisor daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Start the tunnel as soon as the daemon is up
    pub auto_start: bool,

    /// Tunnel process settings
    pub tunnel: TunnelSettings,

    /// Provider and server selection settings
    pub provider: ProviderSettings,

    /// Crash backoff configuration
    pub backoff: BackoffConfig,

    /// Control (IPC) server configuration
    pub control: ControlConfig,

    /// Bound on the port forwarding stop when the daemon shuts down
    #[serde(with = "duration_millis")]
    pub shutdown_port_forward_timeout: Duration,

    /// Known servers for the provider
    pub servers: Vec<Server>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            tunnel: TunnelSettings::default(),
            provider: ProviderSettings::default(),
            backoff: BackoffConfig::default(),
            control: ControlConfig::default(),
            shutdown_port_forward_timeout: Duration::from_millis(100),
            servers: vec![],
        }
    }
}

impl SupervisorConfig {
    /// Settings handed to the supervisor for one iteration
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            tunnel: self.tunnel.clone(),
            provider: self.provider.clone(),
            servers: self.servers.clone(),
        }
    }

    /// Reject settings the supervisor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff.validate()
    }
}

/// Exponential crash backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry after a crash
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(15),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Check that the delays can be computed from these settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "backoff jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        if self.max < self.initial {
            return Err(ConfigError::Invalid(format!(
                "backoff max {:?} is below initial {:?}",
                self.max, self.initial
            )));
        }
        Ok(())
    }
}

/// Control server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Whether the control server is started
    pub enabled: bool,

    /// Port on 127.0.0.1
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
        }
    }
}

impl ControlConfig {
    /// Get the control address (localhost:port)
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_defaults_are_sane() {
        let backoff = BackoffConfig::default();
        assert!(backoff.initial > Duration::ZERO);
        assert!(backoff.max >= backoff.initial);
        assert!(backoff.multiplier >= 1.0);
    }

    #[test]
    fn test_backoff_validation() {
        assert!(SupervisorConfig::default().validate().is_ok());

        let invalid = [
            BackoffConfig {
                multiplier: -1.0,
                ..Default::default()
            },
            BackoffConfig {
                multiplier: f64::NAN,
                ..Default::default()
            },
            BackoffConfig {
                jitter: 1.5,
                ..Default::default()
            },
            BackoffConfig {
                max: Duration::from_secs(5),
                ..Default::default()
            },
        ];
        for backoff in invalid {
            assert!(
                matches!(backoff.validate(), Err(ConfigError::Invalid(_))),
                "accepted {:?}",
                backoff
            );
        }
    }

    #[test]
    fn test_snapshot_copies_settings() {
        let mut config = SupervisorConfig::default();
        config.provider.name = "acme".to_string();
        config.servers.push(Server {
            hostname: "a".to_string(),
            ..Default::default()
        });

        let snapshot = config.snapshot();
        config.provider.name = "changed".to_string();

        assert_eq!(snapshot.provider.name, "acme");
        assert_eq!(snapshot.servers.len(), 1);
    }

    #[test]
    fn test_control_address_is_loopback() {
        let control = ControlConfig {
            enabled: true,
            port: 9999,
        };
        assert_eq!(control.address(), "127.0.0.1:9999");
    }
}
