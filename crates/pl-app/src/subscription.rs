use pl_core::DeviceEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a device-event callback. Delivery stops on [`Subscription::unsubscribe`]
/// or when the handle is dropped.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Forward every event from `events` to `callback` on a dedicated task.
    pub(crate) fn spawn<F>(mut events: broadcast::Receiver<DeviceEvent>, callback: F) -> Self
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => callback(event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Subscriber lagged behind device events");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Device event subscription ended");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop delivery and wait for the forwarding task to finish, so no
    /// callback runs after this returns.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_core::DeviceId;
    use std::sync::{Arc, Mutex};

    fn forgotten(id: &str) -> DeviceEvent {
        DeviceEvent::DeviceForgotten {
            device_id: DeviceId::new(id),
        }
    }

    #[tokio::test]
    async fn delivers_until_unsubscribed() {
        let (tx, rx) = broadcast::channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = Subscription::spawn(rx, move |event| {
            sink.lock().unwrap().push(event.device_id().to_string());
        });

        tx.send(forgotten("a")).unwrap();
        for _ in 0..50 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        subscription.unsubscribe().await;
        let _ = tx.send(forgotten("b"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn drop_stops_the_forwarding_task() {
        let (tx, rx) = broadcast::channel::<DeviceEvent>(8);
        let subscription = Subscription::spawn(rx, |_| {});
        assert!(subscription.is_active());
        drop(subscription);

        for _ in 0..50 {
            if tx.receiver_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(tx.receiver_count(), 0);
    }
}
