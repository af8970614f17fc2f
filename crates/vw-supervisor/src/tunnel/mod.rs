//! Tunnel lifecycle
//!
//! - `backoff`: crash retry delays
//! - `collector`: process output handling and the tunnel-up trigger
//! - `setup`: per-iteration provider, config and firewall preparation
//! - `supervisor`: the state machine tying it all together

mod backoff;
mod collector;
mod setup;
mod supervisor;

pub use backoff::ExponentialBackoff;
pub use collector::{LineCollector, TunnelUpData, TUNNEL_UP_MARKER};
pub use setup::setup;
pub use supervisor::{Supervisor, SupervisorDeps, SupervisorOptions};
