//! Collaborator contracts consumed by the supervisor

mod firewall;
mod port_forward;
mod provider;
mod settings;

pub use firewall::Firewall;
pub use port_forward::PortForwarder;
pub use provider::{Provider, ProviderSelector};
pub use settings::SettingsSource;
