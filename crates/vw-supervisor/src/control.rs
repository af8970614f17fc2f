//! Controller for the tunnel supervisor
//!
//! The controller is the only writer of the supervisor's `start` and `stop`
//! signals. Commands are serialized so that at most one signal is in
//! flight, and each command waits for its effect before returning.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};

use vw_core::Status;

use crate::status::StatusManager;

/// Controller errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The supervisor task has terminated
    #[error("tunnel supervisor is not running")]
    SupervisorGone,

    /// Only `running` and `stopped` can be requested
    #[error("status {0} cannot be requested")]
    InvalidStatus(Status),
}

/// Handle used to start, stop and restart the tunnel
pub struct Controller {
    status: Arc<StatusManager>,
    start_tx: mpsc::Sender<()>,
    stop_tx: mpsc::Sender<()>,
    /// Also serializes commands
    stopped_rx: Mutex<mpsc::Receiver<()>>,
}

impl Controller {
    pub(crate) fn new(
        status: Arc<StatusManager>,
        start_tx: mpsc::Sender<()>,
        stop_tx: mpsc::Sender<()>,
        stopped_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            status,
            start_tx,
            stop_tx,
            stopped_rx: Mutex::new(stopped_rx),
        }
    }

    /// Current tunnel status.
    ///
    /// Waits while a crash transition is being committed.
    pub async fn status(&self) -> Status {
        self.status.status().await
    }

    /// Receive every status the supervisor publishes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Status> {
        self.status.subscribe()
    }

    /// Bring the tunnel to `status` and describe what happened
    pub async fn apply_status(&self, status: Status) -> Result<String, ControlError> {
        match status {
            Status::Running => self.start().await,
            Status::Stopped => self.stop().await,
            other => Err(ControlError::InvalidStatus(other)),
        }
    }

    /// Start the tunnel and wait until it is running or has crashed
    pub async fn start(&self) -> Result<String, ControlError> {
        let _guard = self.stopped_rx.lock().await;

        match self.status.try_status() {
            Some(Status::Stopped) => {}
            // A crash transition holds the status lock
            None | Some(Status::Starting | Status::Running | Status::Crashed) => {
                return Ok("already running".to_string());
            }
        }

        let mut events = self.status.subscribe();
        self.status.set_status(Status::Starting).await;
        if self.start_tx.send(()).await.is_err() {
            self.status.set_status(Status::Stopped).await;
            return Err(ControlError::SupervisorGone);
        }

        loop {
            match events.recv().await {
                Ok(Status::Running) => return Ok("running".to_string()),
                Ok(Status::Crashed) => return Ok("crashed".to_string()),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Missed {} status events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ControlError::SupervisorGone);
                }
            }
        }
    }

    /// Stop the tunnel and wait for the supervisor's acknowledgment
    pub async fn stop(&self) -> Result<String, ControlError> {
        let mut stopped_rx = self.stopped_rx.lock().await;

        if self.status.try_status() == Some(Status::Stopped) {
            return Ok("already stopped".to_string());
        }

        self.stop_tx
            .send(())
            .await
            .map_err(|_| ControlError::SupervisorGone)?;

        match stopped_rx.recv().await {
            Some(()) => Ok("stopped".to_string()),
            None => Err(ControlError::SupervisorGone),
        }
    }

    /// Tear the running tunnel down and set it up again.
    ///
    /// Does nothing unless the tunnel is running.
    pub async fn restart(&self) -> Result<String, ControlError> {
        let _guard = self.stopped_rx.lock().await;

        if self.status.try_status() != Some(Status::Running) {
            return Ok("not running".to_string());
        }

        self.start_tx
            .send(())
            .await
            .map_err(|_| ControlError::SupervisorGone)?;
        Ok("restarting".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(
        initial: Status,
    ) -> (
        Controller,
        Arc<StatusManager>,
        mpsc::Receiver<()>,
        mpsc::Receiver<()>,
        mpsc::Sender<()>,
    ) {
        let status = Arc::new(StatusManager::new(initial));
        let (start_tx, start_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (stopped_tx, stopped_rx) = mpsc::channel(1);
        let controller = Controller::new(Arc::clone(&status), start_tx, stop_tx, stopped_rx);
        (controller, status, start_rx, stop_rx, stopped_tx)
    }

    #[tokio::test]
    async fn test_start_when_running() {
        let (controller, _status, mut start_rx, _stop_rx, _stopped_tx) =
            controller(Status::Running);

        assert_eq!(controller.start().await.unwrap(), "already running");
        assert!(start_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_when_stopped() {
        let (controller, _status, _start_rx, mut stop_rx, _stopped_tx) =
            controller(Status::Stopped);

        assert_eq!(controller.stop().await.unwrap(), "already stopped");
        assert!(stop_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_waits_for_running() {
        let (controller, status, mut start_rx, _stop_rx, _stopped_tx) =
            controller(Status::Stopped);

        let supervisor = tokio::spawn(async move {
            start_rx.recv().await.unwrap();
            status.set_status(Status::Running).await;
        });

        assert_eq!(controller.start().await.unwrap(), "running");
        supervisor.await.unwrap();
        assert_eq!(controller.status().await, Status::Running);
    }

    #[tokio::test]
    async fn test_stop_waits_for_acknowledgment() {
        let (controller, status, _start_rx, mut stop_rx, stopped_tx) =
            controller(Status::Running);

        tokio::spawn(async move {
            stop_rx.recv().await.unwrap();
            status.set_status(Status::Stopped).await;
            stopped_tx.send(()).await.unwrap();
        });

        assert_eq!(controller.stop().await.unwrap(), "stopped");
    }

    #[tokio::test]
    async fn test_supervisor_gone() {
        let (controller, _status, start_rx, stop_rx, stopped_tx) = controller(Status::Stopped);
        drop((start_rx, stop_rx, stopped_tx));

        assert_eq!(
            controller.start().await,
            Err(ControlError::SupervisorGone)
        );
    }

    #[tokio::test]
    async fn test_invalid_status() {
        let (controller, ..) = controller(Status::Stopped);

        assert_eq!(
            controller.apply_status(Status::Crashed).await,
            Err(ControlError::InvalidStatus(Status::Crashed))
        );
    }

    #[tokio::test]
    async fn test_restart_requires_running() {
        let (controller, _status, mut start_rx, _stop_rx, _stopped_tx) =
            controller(Status::Stopped);

        assert_eq!(controller.restart().await.unwrap(), "not running");
        assert!(start_rx.try_recv().is_err());
    }
}
