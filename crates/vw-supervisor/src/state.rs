//! Process-wide settings state

use std::sync::RwLock;

use vw_core::config::SupervisorConfig;
use vw_core::traits::SettingsSource;
use vw_core::SettingsSnapshot;

/// Holds the daemon configuration and hands out per-iteration snapshots
///
/// Updates made with [`SettingsStore::update`] are seen by the supervisor
/// at the start of its next iteration.
pub struct SettingsStore {
    config: RwLock<SupervisorConfig>,
}

impl SettingsStore {
    /// Create a store from the loaded configuration
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Copy of the current configuration
    pub fn config(&self) -> SupervisorConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Modify the configuration in place
    pub fn update(&self, f: impl FnOnce(&mut SupervisorConfig)) {
        let mut config = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut config);
    }
}

impl SettingsSource for SettingsStore {
    fn snapshot(&self) -> SettingsSnapshot {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_is_visible_in_next_snapshot() {
        let store = SettingsStore::new(SupervisorConfig::default());
        let before = store.snapshot();

        store.update(|config| config.provider.port_forwarding.enabled = true);

        assert!(!before.provider.port_forwarding.enabled);
        assert!(store.snapshot().provider.port_forwarding.enabled);
        assert!(store.config().provider.port_forwarding.enabled);
    }
}
