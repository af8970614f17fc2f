//! Tunnel process output collection
//!
//! Drains stdout and stderr of the tunnel process, logs every line and
//! starts port forwarding the first time the tunnel reports it is up.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vw_core::traits::PortForwarder;

/// Line OpenVPN prints once the tunnel is ready for traffic
pub const TUNNEL_UP_MARKER: &str = "Initialization Sequence Completed";

/// What the collector needs to react to the tunnel coming up
#[derive(Clone)]
pub struct TunnelUpData {
    /// Server the tunnel is connected to
    pub server_name: String,
    /// Whether port forwarding should be started
    pub port_forwarding: bool,
    /// Port forwarding collaborator
    pub port_forwarder: Arc<dyn PortForwarder>,
}

/// Guards port forwarding starts against a concurrent teardown.
///
/// A start only runs while holding `armed` set to true. Closing the gate
/// aborts an in-flight start, then clears `armed` under the lock, so no
/// start can complete after [`LineCollector::close_port_forwarding`]
/// returns.
struct PortForwardGate {
    armed: Mutex<bool>,
    abort: CancellationToken,
}

/// A running line collection task
///
/// Dropping it without calling [`LineCollector::stop`] leaves the task
/// running until both streams close.
pub struct LineCollector {
    scope: CancellationToken,
    gate: Arc<PortForwardGate>,
    handle: JoinHandle<()>,
}

impl LineCollector {
    /// Spawn a collector over the process output streams
    pub fn spawn(
        stdout: mpsc::Receiver<String>,
        stderr: mpsc::Receiver<String>,
        tunnel_up: TunnelUpData,
    ) -> Self {
        let scope = CancellationToken::new();
        let gate = Arc::new(PortForwardGate {
            armed: Mutex::new(true),
            abort: CancellationToken::new(),
        });
        let handle = tokio::spawn(collect_lines(
            scope.clone(),
            Arc::clone(&gate),
            stdout,
            stderr,
            tunnel_up,
        ));
        Self {
            scope,
            gate,
            handle,
        }
    }

    /// Make sure the collector never starts port forwarding from now on.
    ///
    /// Returns once any start in flight has been abandoned or has finished.
    pub async fn close_port_forwarding(&self) {
        self.gate.abort.cancel();
        *self.gate.armed.lock().await = false;
    }

    /// Stop collecting and wait until the task is gone
    pub async fn stop(self) {
        self.scope.cancel();
        self.join().await;
    }

    /// Wait for the task to end on its own, once a stream has closed
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Line collector task failed: {}", e);
        }
    }
}

/// Drain both streams until one closes or `scope` is cancelled
async fn collect_lines(
    scope: CancellationToken,
    gate: Arc<PortForwardGate>,
    mut stdout: mpsc::Receiver<String>,
    mut stderr: mpsc::Receiver<String>,
    tunnel_up: TunnelUpData,
) {
    // Taken on the first marker so port forwarding starts at most once
    let mut pending_tunnel_up = Some(tunnel_up);

    loop {
        let (line, from_stderr) = tokio::select! {
            _ = scope.cancelled() => break,
            line = stdout.recv() => match line {
                Some(line) => (line, false),
                None => break,
            },
            line = stderr.recv() => match line {
                Some(line) => (line, true),
                None => break,
            },
        };

        let message = strip_timestamp(&line);
        log_line(message, from_stderr);

        if message.contains(TUNNEL_UP_MARKER) {
            if let Some(data) = pending_tunnel_up.take() {
                on_tunnel_up(&scope, &gate, data).await;
            }
        }
    }

    tracing::debug!("Line collector exiting");
}

async fn on_tunnel_up(scope: &CancellationToken, gate: &PortForwardGate, data: TunnelUpData) {
    tracing::info!("VPN tunnel is up, connected to {}", data.server_name);

    if !data.port_forwarding {
        return;
    }

    let armed = gate.armed.lock().await;
    if !*armed {
        tracing::debug!("Tunnel is being torn down, not starting port forwarding");
        return;
    }

    tokio::select! {
        _ = scope.cancelled() => {
            tracing::debug!("Port forwarding start abandoned, collector stopping");
        }
        _ = gate.abort.cancelled() => {
            tracing::debug!("Port forwarding start abandoned, tunnel is being torn down");
        }
        result = data.port_forwarder.start(&data.server_name) => {
            if let Err(e) = result {
                tracing::error!("Failed to start port forwarding: {}", e);
            }
        }
    }
    drop(armed);
}

fn log_line(message: &str, from_stderr: bool) {
    if from_stderr {
        tracing::error!(target: "openvpn", "{}", message);
    } else if message.contains("AUTH_FAILED") {
        tracing::error!(
            target: "openvpn",
            "{} (check your credentials file)",
            message
        );
    } else if let Some(warning) = message.strip_prefix("WARNING: ") {
        tracing::warn!(target: "openvpn", "{}", warning);
    } else {
        tracing::info!(target: "openvpn", "{}", message);
    }
}

/// Strip the `YYYY-MM-DD HH:MM:SS ` prefix OpenVPN puts on its log lines
fn strip_timestamp(line: &str) -> &str {
    const PREFIX_LEN: usize = "2006-01-02 15:04:05 ".len();

    let bytes = line.as_bytes();
    if bytes.len() < PREFIX_LEN {
        return line;
    }

    let is_timestamp = bytes[..PREFIX_LEN].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 | 19 => *b == b' ',
        13 | 16 => *b == b':',
        _ => b.is_ascii_digit(),
    });

    if is_timestamp {
        &line[PREFIX_LEN..]
    } else {
        line
    }
}
