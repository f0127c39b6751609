mod local;
mod sqlite;

pub use local::*;
pub use sqlite::*;

use crate::config::BridgeKind;
use crate::db::Database;
use crate::event::TaskEvent;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the per-subscriber delivery queue
pub const SUBSCRIBER_BUFFER: usize = 256;

/// At-least-once relay of task events between the process executing a task
/// and the processes serving users.
///
/// Publishing is best-effort: transport failures are logged, never returned,
/// so the engine behaves the same with or without a bridge.
#[async_trait]
pub trait EventBridge: Debug + Send + Sync {
    async fn publish(&self, event: &TaskEvent);

    /// Events of one task (`Some(id)`) or of every task (`None`). The
    /// receiver yields `None` once the transport shuts down.
    fn subscribe(&self, task_id: Option<&str>) -> mpsc::Receiver<TaskEvent>;
}

/// Bridge used when no transport is configured
#[derive(Debug, Default, Clone)]
pub struct NullBridge;

#[async_trait]
impl EventBridge for NullBridge {
    async fn publish(&self, _event: &TaskEvent) {}

    fn subscribe(&self, _task_id: Option<&str>) -> mpsc::Receiver<TaskEvent> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

/// Builds the configured bridge. The SQLite transport must be created from
/// within a tokio runtime since subscriptions spawn poll tasks.
pub fn build_bridge(kind: BridgeKind, database: &Database, poll_interval: Duration) -> Arc<dyn EventBridge> {
    match kind {
        BridgeKind::None => Arc::new(NullBridge),
        BridgeKind::Local => Arc::new(LocalBridge::new(SUBSCRIBER_BUFFER)),
        BridgeKind::Sqlite => Arc::new(SqliteBridge::new(database.clone(), poll_interval)),
    }
}
