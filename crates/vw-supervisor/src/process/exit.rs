//! One-shot exit signal of a tunnel process
//!
//! The exit watcher delivers the process's termination result exactly once.
//! Depending on how an iteration ends the supervisor either waits for that
//! result, closes the signal, or both. `ExitSignal` keeps track of what has
//! been observed so that no call path can block on a result that was
//! already taken, or mistake a closed signal for a second exit.

use tokio::sync::oneshot;

use vw_core::error::ProcessError;

/// Termination result of a tunnel process
pub type ExitResult = Result<(), ProcessError>;

/// Producer half, owned by the exit watcher
#[derive(Debug)]
pub struct ExitNotifier {
    tx: oneshot::Sender<ExitResult>,
}

impl ExitNotifier {
    /// Deliver the termination result
    pub fn notify(self, result: ExitResult) {
        if self.tx.send(result).is_err() {
            tracing::debug!("Exit signal was closed before the process ended");
        }
    }
}

/// Consumer half, owned by the supervisor iteration
#[derive(Debug)]
pub struct ExitSignal {
    rx: Option<oneshot::Receiver<ExitResult>>,
    received: bool,
}

impl ExitSignal {
    /// Create a connected notifier/signal pair
    pub fn channel() -> (ExitNotifier, ExitSignal) {
        let (tx, rx) = oneshot::channel();
        (
            ExitNotifier { tx },
            ExitSignal {
                rx: Some(rx),
                received: false,
            },
        )
    }

    /// Wait for the process to exit.
    ///
    /// Cancel safe, so it can be used as a `select!` branch. Once the result
    /// has been taken, or the signal closed, this never completes.
    pub async fn recv(&mut self) -> ExitResult {
        match self.take().await {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    /// Wait for the process to exit unless that was already observed.
    ///
    /// Returns `None` without waiting when the result was already taken or
    /// the signal closed.
    pub async fn consume(&mut self) -> Option<ExitResult> {
        self.take().await
    }

    /// Close the signal. Idempotent.
    pub fn close(&mut self) {
        self.rx = None;
    }

    /// Whether the termination result has been taken
    pub fn is_received(&self) -> bool {
        self.received
    }

    async fn take(&mut self) -> Option<ExitResult> {
        let rx = self.rx.as_mut()?;
        let result = rx
            .await
            .unwrap_or_else(|_| Err(ProcessError::Exited("exit watcher gone".to_string())));
        self.rx = None;
        self.received = true;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_recv_then_consume_does_not_block() {
        let (notifier, mut exit) = ExitSignal::channel();
        notifier.notify(Err(ProcessError::Exited("exit status: 1".to_string())));

        assert!(exit.recv().await.is_err());
        assert!(exit.is_received());
        assert!(exit.consume().await.is_none());
    }

    #[tokio::test]
    async fn test_consume_waits_for_exit() {
        let (notifier, mut exit) = ExitSignal::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            notifier.notify(Ok(()));
        });

        let result = exit.consume().await;
        assert!(matches!(result, Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_recv_pends_after_close() {
        let (notifier, mut exit) = ExitSignal::channel();
        notifier.notify(Ok(()));
        exit.consume().await;
        exit.close();
        exit.close();

        let pending = tokio::time::timeout(Duration::from_millis(20), exit.recv()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_dropped_notifier_reports_exit() {
        let (notifier, mut exit) = ExitSignal::channel();
        drop(notifier);
        assert!(exit.recv().await.is_err());
    }
}
