//! Tunnel status management
//!
//! The `StatusManager` holds the single process-wide tunnel status behind an
//! async mutex. Simple updates go through [`StatusManager::set_status`].
//! Transitions that must look atomic to outside readers (stop the
//! dependents, then publish the new status, then wait) go through
//! [`StatusManager::commit_transition`], which keeps the lock for the whole
//! sequence so that [`StatusManager::status`] never observes a half-done
//! transition.

use std::future::Future;

use tokio::sync::{broadcast, Mutex};

use vw_core::Status;

/// Capacity of the status event channel.
///
/// Subscribers that fall further behind than this miss intermediate
/// statuses and get a `Lagged` error; the current value is always
/// available through `status()`.
const STATUS_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Thread-safe holder of the tunnel status
pub struct StatusManager {
    current: Mutex<Status>,
    events: broadcast::Sender<Status>,
}

impl StatusManager {
    /// Create a status manager starting at `initial`
    pub fn new(initial: Status) -> Self {
        let (events, _) = broadcast::channel(STATUS_EVENT_CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(initial),
            events,
        }
    }

    /// Current status.
    ///
    /// Waits for any in-flight [`commit_transition`](Self::commit_transition)
    /// to finish.
    pub async fn status(&self) -> Status {
        *self.current.lock().await
    }

    /// Current status, or `None` while a compound transition holds the lock
    pub fn try_status(&self) -> Option<Status> {
        self.current.try_lock().ok().map(|current| *current)
    }

    /// Set and publish a new status
    pub async fn set_status(&self, status: Status) {
        let mut current = self.current.lock().await;
        *current = status;
        self.publish(status);
    }

    /// Run `teardown`, publish `status`, then run `after`, all under the
    /// status lock.
    ///
    /// Neither future may call back into this status manager.
    pub async fn commit_transition<T, A, R>(&self, status: Status, teardown: T, after: A) -> R
    where
        T: Future<Output = ()>,
        A: Future<Output = R>,
    {
        let mut current = self.current.lock().await;
        teardown.await;
        *current = status;
        self.publish(status);
        after.await
    }

    /// Receive every status published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Status> {
        self.events.subscribe()
    }

    fn publish(&self, status: Status) {
        tracing::info!("Tunnel status: {}", status);
        // No subscribers is fine
        let _ = self.events.send(status);
    }
}

impl Default for StatusManager {
    fn default() -> Self {
        Self::new(Status::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_set_status_publishes() {
        let manager = StatusManager::default();
        let mut events = manager.subscribe();

        manager.set_status(Status::Running).await;

        assert_eq!(manager.status().await, Status::Running);
        assert_eq!(events.recv().await.unwrap(), Status::Running);
    }

    #[tokio::test]
    async fn test_commit_transition_runs_in_order() {
        let manager = StatusManager::new(Status::Running);
        let mut events = manager.subscribe();
        let order = std::sync::Mutex::new(Vec::new());

        let value = manager
            .commit_transition(
                Status::Crashed,
                async {
                    order.lock().unwrap().push("teardown");
                },
                async {
                    order.lock().unwrap().push("after");
                    42
                },
            )
            .await;

        assert_eq!(value, 42);
        assert_eq!(*order.lock().unwrap(), vec!["teardown", "after"]);
        assert_eq!(events.recv().await.unwrap(), Status::Crashed);
        assert_eq!(manager.status().await, Status::Crashed);
    }

    #[tokio::test]
    async fn test_readers_wait_for_transition() {
        let manager = Arc::new(StatusManager::new(Status::Running));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (entered_tx, entered_rx) = oneshot::channel::<()>();

        let transition = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .commit_transition(
                        Status::Crashed,
                        async move {
                            let _ = entered_tx.send(());
                            let _ = release_rx.await;
                        },
                        async {},
                    )
                    .await;
            })
        };

        entered_rx.await.unwrap();

        // The reader must not see Running while the teardown is in flight
        let reader = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.status().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());
        assert_eq!(manager.try_status(), None);

        release_tx.send(()).unwrap();
        transition.await.unwrap();
        assert_eq!(reader.await.unwrap(), Status::Crashed);
        assert_eq!(manager.try_status(), Some(Status::Crashed));
    }
}
