use super::{EventBridge, SUBSCRIBER_BUFFER};
use crate::db::{Database, EventRepository, EventRow};
use crate::event::{task_channel, ApprovalMessage, TaskEvent};
use crate::errors::StoreError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const POLL_BATCH: i64 = 100;

/// Durable outbox in the shared database. Subscribers poll by sequence
/// number, so every event is delivered at least once to every subscriber
/// that is running when (or, for task subscriptions, after) it is published.
#[derive(Debug, Clone)]
pub struct SqliteBridge {
    events: EventRepository,
    poll_interval: Duration,
}

impl SqliteBridge {
    pub fn new(database: Database, poll_interval: Duration) -> Self {
        SqliteBridge {
            events: EventRepository::new(database),
            poll_interval,
        }
    }

    fn encode(event: &TaskEvent) -> Result<String, serde_json::Error> {
        match ApprovalMessage::from_event(event) {
            Some(message) => serde_json::to_string(&message),
            None => serde_json::to_string(event),
        }
    }

    fn decode(row: &EventRow) -> Result<TaskEvent, serde_json::Error> {
        if row.kind == "approval_received" {
            let message: ApprovalMessage = serde_json::from_str(&row.payload)?;
            return Ok(message.into_event());
        }
        serde_json::from_str(&row.payload)
    }

    fn append(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let payload = Self::encode(event)?;
        self.events
            .append(&event.task_id, &event.channel(), event.kind.name(), &payload)
    }
}

#[async_trait]
impl EventBridge for SqliteBridge {
    async fn publish(&self, event: &TaskEvent) {
        match self.append(event) {
            Ok(()) => debug!("Published {} for task {}", event.kind.name(), event.task_id),
            Err(e) => warn!(
                "Failed to publish {} for task {}: {}",
                event.kind.name(),
                event.task_id,
                e
            ),
        }
    }

    /// Task subscriptions replay the task's history; global subscriptions
    /// start at the current end of the outbox.
    fn subscribe(&self, task_id: Option<&str>) -> mpsc::Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let events = self.events.clone();
        let poll_interval = self.poll_interval;
        let channel = task_id.map(task_channel);

        tokio::spawn(async move {
            let mut cursor = match &channel {
                Some(_) => 0,
                None => match events.last_seq() {
                    Ok(seq) => seq,
                    Err(e) => {
                        warn!("Event subscription failed to start: {}", e);
                        return;
                    }
                },
            };

            while !tx.is_closed() {
                let rows = match events.read_after(cursor, channel.as_deref(), POLL_BATCH) {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!("Failed to poll task events: {}", e);
                        Vec::new()
                    }
                };
                let caught_up = (rows.len() as i64) < POLL_BATCH;

                for row in rows {
                    cursor = row.seq;
                    match Self::decode(&row) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Skipping undecodable event {}: {}", row.seq, e),
                    }
                }
                if caught_up {
                    tokio::time::sleep(poll_interval).await;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{reopen, temp_database};
    use crate::event::EventKind;

    #[tokio::test]
    async fn events_cross_database_handles() {
        let (dir, db) = temp_database();
        let worker_side = SqliteBridge::new(db, Duration::from_millis(20));
        let api_side = SqliteBridge::new(reopen(&dir), Duration::from_millis(20));

        worker_side
            .publish(&TaskEvent::new(
                "t",
                EventKind::StatusUpdate {
                    step: crate::core::TaskStatus::Planning,
                    message: "planning".into(),
                },
            ))
            .await;
        let mut rx = api_side.subscribe(Some("t"));
        let mut relayed = worker_side.subscribe(None);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind.name(), "status_update");

        let decision = TaskEvent::new(
            "t",
            EventKind::ApprovalReceived {
                approved: true,
                feedback: None,
                round: Some(1),
            },
        );
        api_side.publish(&decision).await;
        assert_eq!(rx.recv().await.unwrap(), decision);
        assert_eq!(relayed.recv().await.unwrap(), decision);
    }
}
