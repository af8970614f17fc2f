//! Control server for local clients
//!
//! Serves the `vw_core::ipc` protocol on localhost TCP so that scripts and
//! health checks can query and change the tunnel status.

mod server;

pub use server::IpcServer;
