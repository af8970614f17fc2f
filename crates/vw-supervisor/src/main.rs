//! vpnwarden daemon
//!
//! Keeps an OpenVPN tunnel up, restarts it when it crashes and exposes a
//! local control server to start and stop it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vw_core::config::{self, SupervisorConfig};
use vw_core::Status;
use vw_supervisor::firewall::PassthroughFirewall;
use vw_supervisor::ipc::IpcServer;
use vw_supervisor::process::OpenVpnRunner;
use vw_supervisor::provider::DefaultProviderSelector;
use vw_supervisor::{SettingsStore, Supervisor, SupervisorDeps, SupervisorOptions};

#[derive(Parser)]
#[command(name = "vpnwarden")]
#[command(about = "vpnwarden - OpenVPN tunnel supervisor")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VPNWARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Wait for a start request instead of starting the tunnel right away
    #[arg(long)]
    no_start: bool,

    /// Port of the local control server
    #[arg(long)]
    control_port: Option<u16>,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);

    if args.write_default_config {
        config::save_config(&config_path, &SupervisorConfig::default())
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    tracing::info!("vpnwarden starting...");

    // Load configuration
    let mut config = if config_path.exists() {
        config::load_config(&config_path)
            .and_then(|config: SupervisorConfig| config.validate().map(|()| config))
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
                SupervisorConfig::default()
            })
    } else {
        tracing::info!("No config at {:?}, using defaults", config_path);
        SupervisorConfig::default()
    };

    // Apply command-line overrides
    if args.no_start {
        config.auto_start = false;
    }
    if let Some(port) = args.control_port {
        config.control.port = port;
    }

    if config.servers.is_empty() {
        tracing::warn!("Server list is empty, the tunnel cannot be set up");
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let settings = Arc::new(SettingsStore::new(config.clone()));
    let deps = SupervisorDeps {
        settings,
        providers: Arc::new(DefaultProviderSelector::new()),
        firewall: Arc::new(PassthroughFirewall::new()),
        runner: Arc::new(OpenVpnRunner::new()),
    };
    let (supervisor, controller) = Supervisor::new(deps, SupervisorOptions::from_config(&config));
    let controller = Arc::new(controller);
    let supervisor_handle = supervisor.spawn(cancel.clone());

    // Spawn IPC server task
    let ipc_handle = if config.control.enabled {
        let ipc_server = IpcServer::new(config.control.address(), Arc::clone(&controller))
            .with_shutdown_token(cancel.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = ipc_server.run().await {
                tracing::error!("IPC server error: {}", e);
            }
        }))
    } else {
        None
    };

    if config.auto_start {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            match controller.apply_status(Status::Running).await {
                Ok(outcome) => tracing::info!("Auto start: {}", outcome),
                Err(e) => tracing::warn!("Auto start failed: {}", e),
            }
        });
    }

    supervisor_handle
        .await
        .context("Tunnel supervisor task failed")?;

    if let Some(handle) = ipc_handle {
        handle.await.context("IPC server task failed")?;
    }

    tracing::info!("vpnwarden stopped");
    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_log_level_is_the_only_verbosity_switch() {
        let args = Args::try_parse_from(["vpnwarden", "--log-level", "debug"]).unwrap();
        assert_eq!(args.log_level, "debug");

        assert!(Args::try_parse_from(["vpnwarden", "--foreground"]).is_err());
        assert!(Args::try_parse_from(["vpnwarden", "-f"]).is_err());
    }
}
