use super::EventBridge;
use crate::event::TaskEvent;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// In-process fan-out over a broadcast channel
#[derive(Debug, Clone)]
pub struct LocalBridge {
    sender: broadcast::Sender<TaskEvent>,
    buffer: usize,
}

impl LocalBridge {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        LocalBridge { sender, buffer }
    }
}

#[async_trait]
impl EventBridge for LocalBridge {
    async fn publish(&self, event: &TaskEvent) {
        // no subscriber is not an error
        let _ = self.sender.send(event.clone());
    }

    fn subscribe(&self, task_id: Option<&str>) -> mpsc::Receiver<TaskEvent> {
        let mut events = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(self.buffer);
        let filter = task_id.map(str::to_string);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if filter.as_ref().is_some_and(|id| *id != event.task_id) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, {} events dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}
