//! Settings source trait

use crate::types::SettingsSnapshot;

/// Process-wide configuration state read by the supervisor
///
/// `snapshot` must not block: it is called once at the start of every
/// supervisor iteration and the returned value is used for the whole
/// iteration.
pub trait SettingsSource: Send + Sync {
    /// Read tunnel settings, provider settings and the server list atomically
    fn snapshot(&self) -> SettingsSnapshot;
}
