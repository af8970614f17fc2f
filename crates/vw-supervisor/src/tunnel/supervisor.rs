//! Tunnel supervisor
//!
//! One supervisor task owns the tunnel lifecycle. Every iteration takes a
//! settings snapshot, runs setup, starts the tunnel process and then waits
//! for the first of four events:
//!
//! - top-level cancellation: bounded port forwarding stop, process and
//!   collector teardown, `Stopped` status, then `run` returns
//! - user stop: blocking teardown, `Stopped` status and an acknowledgment,
//!   then wait for the next start
//! - user restart: teardown and a fresh iteration
//! - unexpected process exit: teardown and `Crashed` status committed as
//!   one transition, followed by the crash backoff
//!
//! Each iteration tears down everything it started before the next one
//! begins, so at most one tunnel process and one line collector are alive
//! at any time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vw_core::config::{BackoffConfig, SupervisorConfig};
use vw_core::error::{ProcessError, SupervisorError};
use vw_core::traits::{Firewall, PortForwarder, ProviderSelector, SettingsSource};
use vw_core::Status;

use super::backoff::ExponentialBackoff;
use super::collector::{LineCollector, TunnelUpData};
use super::setup::setup;
use crate::control::Controller;
use crate::process::{ExitResult, ProcessHandles, ProcessRunner};
use crate::status::StatusManager;

/// Collaborators the supervisor drives
#[derive(Clone)]
pub struct SupervisorDeps {
    pub settings: Arc<dyn SettingsSource>,
    pub providers: Arc<dyn ProviderSelector>,
    pub firewall: Arc<dyn Firewall>,
    pub runner: Arc<dyn ProcessRunner>,
}

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Crash backoff policy
    pub backoff: BackoffConfig,
    /// Bound on the port forwarding stop on cancellation
    pub shutdown_port_forward_timeout: Duration,
}

impl SupervisorOptions {
    /// Options from the daemon configuration
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            backoff: config.backoff.clone(),
            shutdown_port_forward_timeout: config.shutdown_port_forward_timeout,
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

/// Where the supervisor goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingStart,
    SettingUp,
    Terminated,
}

/// What ended a running iteration
enum TunnelEvent {
    Cancelled,
    Stop,
    Restart,
    Exited(ExitResult),
}

/// What ended a backoff wait
enum BackoffOutcome {
    Elapsed,
    Cancelled,
    Stopped,
}

/// The connection supervisor
pub struct Supervisor {
    deps: SupervisorDeps,
    status: Arc<StatusManager>,
    backoff: ExponentialBackoff,
    shutdown_port_forward_timeout: Duration,
    start_rx: Option<mpsc::Receiver<()>>,
    stop_rx: Option<mpsc::Receiver<()>>,
    stopped_tx: mpsc::Sender<()>,
}

impl Supervisor {
    /// Create a supervisor and the controller that drives it
    pub fn new(deps: SupervisorDeps, options: SupervisorOptions) -> (Self, Controller) {
        let status = Arc::new(StatusManager::default());
        let (start_tx, start_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (stopped_tx, stopped_rx) = mpsc::channel(1);

        let supervisor = Self {
            deps,
            status: Arc::clone(&status),
            backoff: ExponentialBackoff::from_config(&options.backoff),
            shutdown_port_forward_timeout: options.shutdown_port_forward_timeout,
            start_rx: Some(start_rx),
            stop_rx: Some(stop_rx),
            stopped_tx,
        };
        let controller = Controller::new(status, start_tx, stop_tx, stopped_rx);

        (supervisor, controller)
    }

    /// Run the supervisor on its own task.
    ///
    /// The handle completes once `cancel` has fired and everything the
    /// supervisor started is torn down.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Supervise the tunnel until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!("Tunnel supervisor waiting for start");

        let mut state = LoopState::AwaitingStart;
        loop {
            state = match state {
                LoopState::AwaitingStart => self.await_start(&cancel).await,
                LoopState::SettingUp if cancel.is_cancelled() => LoopState::Terminated,
                LoopState::SettingUp => self.run_iteration(&cancel).await,
                LoopState::Terminated => break,
            };
        }

        if self.status.status().await != Status::Stopped {
            self.status.set_status(Status::Stopped).await;
        }
        tracing::info!("Tunnel supervisor terminated");
    }

    async fn await_start(&mut self, cancel: &CancellationToken) -> LoopState {
        tokio::select! {
            _ = cancel.cancelled() => LoopState::Terminated,
            _ = recv_signal(&mut self.start_rx) => LoopState::SettingUp,
            _ = recv_signal(&mut self.stop_rx) => {
                self.acknowledge_stop().await;
                LoopState::AwaitingStart
            }
        }
    }

    /// One pass of setup, start and supervision
    async fn run_iteration(&mut self, cancel: &CancellationToken) -> LoopState {
        let process_scope = CancellationToken::new();
        let next = self.supervise_tunnel(cancel, &process_scope).await;
        process_scope.cancel();
        next
    }

    async fn supervise_tunnel(
        &mut self,
        cancel: &CancellationToken,
        process_scope: &CancellationToken,
    ) -> LoopState {
        let snapshot = self.deps.settings.snapshot();

        let setup_result = tokio::select! {
            _ = cancel.cancelled() => return LoopState::Terminated,
            result = setup(
                &snapshot,
                self.deps.providers.as_ref(),
                self.deps.firewall.as_ref(),
                self.deps.runner.as_ref(),
            ) => result,
        };
        let (provider, connection) = match setup_result {
            Ok(resolved) => resolved,
            Err(e) => return self.crash(SupervisorError::Setup(e), async {}, cancel).await,
        };

        let handles = match self
            .deps
            .runner
            .start(process_scope.clone(), &snapshot.tunnel)
            .await
        {
            Ok(handles) => handles,
            Err(e) => {
                let scope = process_scope.clone();
                let teardown = async move { scope.cancel() };
                return self.crash(SupervisorError::Start(e), teardown, cancel).await;
            }
        };
        let ProcessHandles {
            stdout,
            stderr,
            mut exit,
        } = handles;

        let port_forwarder = provider.port_forwarder();
        let port_forwarding = snapshot.provider.port_forwarding.enabled;
        let collector = LineCollector::spawn(
            stdout,
            stderr,
            TunnelUpData {
                server_name: connection.hostname.clone(),
                port_forwarding,
                port_forwarder: Arc::clone(&port_forwarder),
            },
        );

        self.backoff.reset();
        self.status.set_status(Status::Running).await;

        let event = tokio::select! {
            _ = cancel.cancelled() => TunnelEvent::Cancelled,
            _ = recv_signal(&mut self.stop_rx) => TunnelEvent::Stop,
            _ = recv_signal(&mut self.start_rx) => TunnelEvent::Restart,
            result = exit.recv() => TunnelEvent::Exited(result),
        };

        match event {
            TunnelEvent::Cancelled => {
                tracing::info!("Shutting down tunnel");
                collector.close_port_forwarding().await;
                stop_port_forwarding(
                    port_forwarder.as_ref(),
                    port_forwarding,
                    self.shutdown_port_forward_timeout,
                )
                .await;
                process_scope.cancel();
                exit.consume().await;
                exit.close();
                collector.stop().await;
                LoopState::Terminated
            }
            TunnelEvent::Stop => {
                tracing::info!("Stopping tunnel on user request");
                collector.close_port_forwarding().await;
                stop_port_forwarding(port_forwarder.as_ref(), port_forwarding, Duration::ZERO)
                    .await;
                process_scope.cancel();
                // Left open: the result may still be read later
                exit.consume().await;
                collector.stop().await;
                self.acknowledge_stop().await;
                LoopState::AwaitingStart
            }
            TunnelEvent::Restart => {
                tracing::info!("Restarting tunnel on user request");
                process_scope.cancel();
                exit.consume().await;
                collector.stop().await;
                stop_port_forwarding(port_forwarder.as_ref(), port_forwarding, Duration::ZERO)
                    .await;
                LoopState::SettingUp
            }
            TunnelEvent::Exited(result) => {
                exit.close();
                collector.stop().await;

                let error = result
                    .err()
                    .unwrap_or_else(|| ProcessError::Exited("exit status: 0".to_string()));
                let scope = process_scope.clone();
                let teardown = async move {
                    stop_port_forwarding(port_forwarder.as_ref(), port_forwarding, Duration::ZERO)
                        .await;
                    scope.cancel();
                };
                self.crash(SupervisorError::Runtime(error), teardown, cancel)
                    .await
            }
        }
    }

    /// Commit the `Crashed` transition and sit out the backoff
    async fn crash<T>(
        &mut self,
        error: SupervisorError,
        teardown: T,
        cancel: &CancellationToken,
    ) -> LoopState
    where
        T: Future<Output = ()>,
    {
        tracing::error!("{}", error);

        let delay = self.backoff.next_delay();
        let stop_rx = &mut self.stop_rx;
        let outcome = self
            .status
            .commit_transition(Status::Crashed, teardown, async move {
                tracing::info!("Retrying in {:?}", delay);
                wait_backoff(delay, cancel, stop_rx).await
            })
            .await;

        match outcome {
            BackoffOutcome::Elapsed => LoopState::SettingUp,
            BackoffOutcome::Cancelled => LoopState::Terminated,
            BackoffOutcome::Stopped => {
                tracing::info!("Retry cancelled on user request");
                self.acknowledge_stop().await;
                LoopState::AwaitingStart
            }
        }
    }

    async fn acknowledge_stop(&self) {
        self.status.set_status(Status::Stopped).await;
        if self.stopped_tx.send(()).await.is_err() {
            tracing::debug!("Controller gone, stop not acknowledged");
        }
    }
}

/// Wait for a control signal.
///
/// A closed channel is replaced by `None` and never completes again.
async fn recv_signal(rx: &mut Option<mpsc::Receiver<()>>) {
    if let Some(receiver) = rx.as_mut() {
        if receiver.recv().await.is_some() {
            return;
        }
        tracing::debug!("Control channel closed");
        *rx = None;
    }
    std::future::pending::<()>().await
}

async fn wait_backoff(
    delay: Duration,
    cancel: &CancellationToken,
    stop_rx: &mut Option<mpsc::Receiver<()>>,
) -> BackoffOutcome {
    tokio::select! {
        _ = tokio::time::sleep(delay) => BackoffOutcome::Elapsed,
        _ = cancel.cancelled() => BackoffOutcome::Cancelled,
        _ = recv_signal(stop_rx) => BackoffOutcome::Stopped,
    }
}

/// Stop port forwarding when it is enabled.
///
/// A zero `timeout` waits until it is fully stopped. Failures are logged.
async fn stop_port_forwarding(forwarder: &dyn PortForwarder, enabled: bool, timeout: Duration) {
    if !enabled {
        return;
    }

    let result = if timeout.is_zero() {
        forwarder.stop().await.map_err(|e| e.to_string())
    } else {
        match tokio::time::timeout(timeout, forwarder.stop()).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("port forwarding stop timed out after {:?}", timeout)),
        }
    };

    if let Err(message) = result {
        tracing::warn!("{}", SupervisorError::Shutdown(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use vw_core::error::PortForwardError;

    struct HangingPortForwarder {
        stops: AtomicUsize,
        finished: AtomicBool,
    }

    #[async_trait]
    impl PortForwarder for HangingPortForwarder {
        async fn start(&self, _server_name: &str) -> Result<(), PortForwardError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), PortForwardError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn hanging() -> HangingPortForwarder {
        HangingPortForwarder {
            stops: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_stop_is_abandoned() {
        let forwarder = hanging();
        stop_port_forwarding(&forwarder, true, Duration::from_millis(100)).await;

        assert_eq!(forwarder.stops.load(Ordering::SeqCst), 1);
        assert!(!forwarder.finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_blocks_until_stopped() {
        let forwarder = hanging();
        stop_port_forwarding(&forwarder, true, Duration::ZERO).await;

        assert!(forwarder.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disabled_port_forwarding_is_not_stopped() {
        let forwarder = hanging();
        stop_port_forwarding(&forwarder, false, Duration::ZERO).await;

        assert_eq!(forwarder.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_signal_pends_after_close() {
        let (tx, rx) = mpsc::channel::<()>(1);
        let mut rx = Some(rx);
        drop(tx);

        let result = tokio::time::timeout(Duration::from_secs(1), recv_signal(&mut rx)).await;
        assert!(result.is_err());
        assert!(rx.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_wait_interrupted_by_stop() {
        let (tx, rx) = mpsc::channel(1);
        let mut rx = Some(rx);
        tx.send(()).await.unwrap();

        let outcome = wait_backoff(Duration::from_secs(15), &CancellationToken::new(), &mut rx).await;
        assert!(matches!(outcome, BackoffOutcome::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_wait_elapses() {
        let mut rx: Option<mpsc::Receiver<()>> = None;
        let started = tokio::time::Instant::now();

        let outcome = wait_backoff(Duration::from_secs(15), &CancellationToken::new(), &mut rx).await;

        assert!(matches!(outcome, BackoffOutcome::Elapsed));
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }
}
