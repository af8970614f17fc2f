//! Configuration management for vpnwarden

mod provider;
pub mod serde_utils;
mod supervisor;
mod tunnel;

pub use provider::{PortForwardingSettings, ProviderSettings, ServerSelection};
pub use supervisor::{BackoffConfig, ControlConfig, SupervisorConfig};
pub use tunnel::{OpenVpnVersion, TunnelSettings};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vpnwarden")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let result = load_config::<SupervisorConfig>(&path);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_save_then_load_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SupervisorConfig::default();
        config.provider.name = "acme".to_string();
        config.provider.port_forwarding.enabled = true;
        config.tunnel.flags = vec!["--mute-replay-warnings".to_string()];

        save_config(&path, &config).unwrap();
        let loaded: SupervisorConfig = load_config(&path).unwrap();

        assert_eq!(loaded.provider.name, "acme");
        assert!(loaded.provider.port_forwarding.enabled);
        assert_eq!(loaded.tunnel.flags, config.tunnel.flags);
        assert_eq!(loaded.backoff.initial, config.backoff.initial);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[provider]
name = "acme"

[[servers]]
hostname = "nl1.acme.example"
country = "Netherlands"
ips = ["10.0.0.1"]
udp = true
"#,
        )
        .unwrap();

        let config: SupervisorConfig = load_config(&path).unwrap();
        assert_eq!(config.provider.name, "acme");
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].country, "Netherlands");
        assert_eq!(config.tunnel.interface, "tun0");
        assert!(config.auto_start);
    }

    #[test]
    fn test_loaded_backoff_is_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[backoff]
initial = 15
max = 300
multiplier = -1.0
jitter = 0.0
"#,
        )
        .unwrap();

        let config: SupervisorConfig = load_config(&path).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        let result = load_config::<SupervisorConfig>(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
