//! Per-iteration tunnel setup

use std::sync::Arc;

use vw_core::error::SetupError;
use vw_core::traits::{Firewall, Provider, ProviderSelector};
use vw_core::{Connection, SettingsSnapshot};

use crate::process::ProcessRunner;

/// Resolve the provider, pick a connection, write the tunnel config and
/// open the firewall for it
pub async fn setup(
    snapshot: &SettingsSnapshot,
    providers: &dyn ProviderSelector,
    firewall: &dyn Firewall,
    runner: &dyn ProcessRunner,
) -> Result<(Arc<dyn Provider>, Connection), SetupError> {
    let provider = providers.resolve(&snapshot.provider.name, &snapshot.servers)?;
    let connection = provider.connection(&snapshot.provider)?;
    tracing::info!("Connecting to {} via {}", connection, provider.name());

    let lines = provider.tunnel_config(&connection, &snapshot.tunnel);
    runner.write_config(&lines, &snapshot.tunnel).await?;

    firewall
        .allow_vpn_connection(&connection, &snapshot.tunnel.interface)
        .await?;

    Ok((provider, connection))
}
