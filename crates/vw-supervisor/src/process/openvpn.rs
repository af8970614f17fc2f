//! OpenVPN process runner

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vw_core::config::TunnelSettings;
use vw_core::error::ProcessError;

use super::{ExitNotifier, ExitResult, ExitSignal, ProcessHandles, ProcessRunner};

/// Channel capacity for output lines of the tunnel process.
///
/// When the collector falls behind the reader task blocks, which in turn
/// lets the pipe fill up and slows OpenVPN's logging down rather than
/// dropping lines.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Runs the OpenVPN client binary
#[derive(Debug, Default, Clone)]
pub struct OpenVpnRunner;

impl OpenVpnRunner {
    /// Create a new runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for OpenVpnRunner {
    async fn write_config(
        &self,
        lines: &[String],
        settings: &TunnelSettings,
    ) -> Result<(), ProcessError> {
        let path = &settings.config_path;
        let map_err = |source| ProcessError::WriteConfig {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(map_err)?;
        }

        let mut content = lines.join("\n");
        content.push('\n');
        tokio::fs::write(path, content).await.map_err(map_err)?;

        tracing::debug!("Wrote {} config lines to {:?}", lines.len(), path);
        Ok(())
    }

    async fn start(
        &self,
        scope: CancellationToken,
        settings: &TunnelSettings,
    ) -> Result<ProcessHandles, ProcessError> {
        validate_flags(&settings.flags)?;

        let program = settings.program();
        tracing::info!(
            "Starting OpenVPN {} ({})",
            settings.version,
            program.display()
        );

        let mut cmd = Command::new(&program);
        cmd.args(&settings.flags)
            .arg("--config")
            .arg(&settings.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(ProcessError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProcessError::Pipe("stderr"))?;

        let (stdout_tx, stdout_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let (stderr_tx, stderr_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        tokio::spawn(forward_lines(stdout, stdout_tx));
        tokio::spawn(forward_lines(stderr, stderr_tx));

        let (notifier, exit) = ExitSignal::channel();
        tokio::spawn(watch_process(child, scope, settings.kill_grace, notifier));

        Ok(ProcessHandles {
            stdout: stdout_rx,
            stderr: stderr_rx,
            exit,
        })
    }
}

/// Reject flags that would break the command line or replace our config
fn validate_flags(flags: &[String]) -> Result<(), ProcessError> {
    for flag in flags {
        if flag.is_empty() || flag.contains('\0') {
            return Err(ProcessError::InvalidArguments(format!(
                "flag {:?} is empty or contains a NUL byte",
                flag
            )));
        }
        if flag == "--config" {
            return Err(ProcessError::InvalidArguments(
                "--config is set by the supervisor".to_string(),
            ));
        }
    }
    Ok(())
}

/// Forward each line of `reader` until EOF or until nobody listens
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}

/// Wait for the process to exit on its own or terminate it on cancellation
async fn watch_process(
    mut child: Child,
    scope: CancellationToken,
    grace: Duration,
    notifier: ExitNotifier,
) {
    let result = tokio::select! {
        status = child.wait() => exit_result(status),
        _ = scope.cancelled() => terminate(&mut child, grace).await,
    };
    notifier.notify(result);
}

/// SIGTERM, then SIGKILL once `grace` has elapsed
async fn terminate(child: &mut Child, grace: Duration) -> ExitResult {
    request_exit(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => exit_result(status),
        Err(_) => {
            tracing::warn!(
                "Tunnel process did not exit within {:?}, killing it",
                grace
            );
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill tunnel process: {}", e);
            }
            exit_result(child.wait().await)
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain kill(2) on the pid of a child we have not reaped yet
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.start_kill();
}

fn exit_result(status: std::io::Result<ExitStatus>) -> ExitResult {
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(ProcessError::Exited(status.to_string())),
        Err(e) => Err(ProcessError::Wait(e)),
    }
}
