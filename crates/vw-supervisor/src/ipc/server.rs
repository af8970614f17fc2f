//! IPC server implementation
//!
//! Listens on localhost TCP and answers one JSON response per JSON request
//! line.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use vw_core::ipc::{IpcRequest, IpcResponse};

use crate::control::Controller;

/// IPC server for local control clients
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct IpcServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    controller: Arc<Controller>,
    shutdown_token: CancellationToken,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(address: String, controller: Arc<Controller>) -> Self {
        Self {
            address,
            controller,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    /// Serve clients until the shutdown token fires
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", self.address))?;

        tracing::info!("IPC server listening on {}", self.address);

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    // Only accept connections from localhost
                    if !peer_addr.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                        continue;
                    }

                    let controller = Arc::clone(&self.controller);
                    let shutdown_token = self.shutdown_token.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, controller, shutdown_token).await {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }

        tracing::info!("IPC server stopped");
        Ok(())
    }
}

async fn handle_client(
    stream: TcpStream,
    controller: Arc<Controller>,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown_token.cancelled() => break,
            read = reader.read_line(&mut line) => read?,
        };
        if read == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IpcRequest>(trimmed) {
            Ok(request) => handle_request(request, &controller).await,
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
    }

    Ok(())
}

async fn handle_request(request: IpcRequest, controller: &Controller) -> IpcResponse {
    match request {
        IpcRequest::GetStatus => IpcResponse::Status {
            status: controller.status().await,
        },
        IpcRequest::SetStatus { status } => match controller.apply_status(status).await {
            Ok(message) => IpcResponse::Outcome { message },
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },
        IpcRequest::Ping => IpcResponse::Pong,
    }
}
