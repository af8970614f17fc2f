//! vw-core: Core abstractions and configuration for vpnwarden
//!
//! This crate provides the shared types, collaborator traits, configuration
//! structures and control protocol used by the supervisor daemon.

pub mod config;
pub mod error;
pub mod ipc;
pub mod traits;
pub mod types;

pub use error::SupervisorError;
pub use types::{Connection, Server, SettingsSnapshot, Status};
