//! Core error types for vpnwarden

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced at the supervisor's iteration boundary.
///
/// None of these are fatal: `Setup`, `Start` and `Runtime` turn into a
/// `Crashed` status followed by a backoff delay, `Shutdown` is only logged.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Settings resolution or provider setup failed
    #[error("setup failed: {0}")]
    Setup(#[source] SetupError),

    /// The tunnel process could not be launched
    #[error("cannot start tunnel process: {0}")]
    Start(#[source] ProcessError),

    /// The tunnel process exited while it was expected to run
    #[error("tunnel process exited unexpectedly: {0}")]
    Runtime(#[source] ProcessError),

    /// Teardown of a dependent subsystem failed
    #[error("shutdown step failed: {0}")]
    Shutdown(String),
}

/// Failures while preparing an iteration (before the process is spawned)
#[derive(Error, Debug)]
pub enum SetupError {
    /// Provider could not be resolved or could not pick a connection
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Firewall refused to allow the connection
    #[error(transparent)]
    Firewall(#[from] FirewallError),

    /// Tunnel configuration could not be written
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Provider selection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No provider is registered under this name
    #[error("unknown provider: {0}")]
    Unknown(String),

    /// Server filtering left nothing to connect to
    #[error("no server found: {0}")]
    NoServerFound(String),

    /// Selection settings are inconsistent
    #[error("invalid server selection: {0}")]
    InvalidSelection(String),
}

/// Firewall collaborator errors
#[derive(Error, Debug)]
pub enum FirewallError {
    /// Rule could not be applied
    #[error("cannot allow VPN connection on {interface}: {message}")]
    Rule { interface: String, message: String },
}

/// Port forwarding collaborator errors
#[derive(Error, Debug)]
pub enum PortForwardError {
    /// The provider has no port forwarding support
    #[error("port forwarding is not supported by provider {0}")]
    Unsupported(String),
}

/// Tunnel process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Executable could not be found or spawned
    #[error("cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Version or flags are not usable
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Config file could not be written
    #[error("cannot write tunnel config to {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output stream of the spawned process was not captured
    #[error("cannot capture {0} of the tunnel process")]
    Pipe(&'static str),

    /// Process exited with a non-success status
    #[error("process exited with {0}")]
    Exited(String),

    /// Waiting on the process failed
    #[error("cannot wait on process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_display_is_transparent() {
        let err = SupervisorError::Setup(SetupError::Provider(ProviderError::NoServerFound(
            "for VPN openvpn; protocol udp".to_string(),
        )));
        assert_eq!(
            err.to_string(),
            "setup failed: no server found: for VPN openvpn; protocol udp"
        );
    }

    #[test]
    fn test_runtime_error_display() {
        let err = SupervisorError::Runtime(ProcessError::Exited("exit status: 1".to_string()));
        assert_eq!(
            err.to_string(),
            "tunnel process exited unexpectedly: process exited with exit status: 1"
        );
    }
}
